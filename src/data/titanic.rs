//! Passenger survival data: cleaning, derived columns and dashboards.

use crate::analysis::round_to;
use crate::error::DataError;
use crate::models::{BaseTable, Dimension, Statistic};
use crate::view::{Dashboard, PointSpec, ViewSpec};
use polars::prelude::{col, lit, when, ChunkApply, DataType, Expr, IntoSeries, NULL};
use tracing::{debug, info};

/// Catalog name of the prepared table.
pub const TABLE: &str = "titanic";

const REQUIRED: [&str; 4] = ["Survived", "Pclass", "Sex", "Age"];
const GROUP_COLUMNS: [&str; 3] = ["Pclass", "Sex", "AgeGroup"];

/// Age bucket used by the survival dashboards, null for a missing age.
fn age_group(age: Expr) -> Expr {
    when(age.clone().lt(lit(11.0)))
        .then(lit("Child"))
        .when(age.clone().lt(lit(20.0)))
        .then(lit("Young Adult"))
        .when(age.clone().lt(lit(60.0)))
        .then(lit("Adult"))
        .when(age.is_not_null())
        .then(lit("Senior"))
        .otherwise(lit(NULL).cast(DataType::String))
}

/// Clean the raw passenger table and add `AgeGroup` and `SurvivalRate`.
///
/// Missing ages take the median age, missing cabins become "Unknown" and
/// missing ports of embarkation "N/A". `SurvivalRate` is the percentage of
/// survivors in the passenger's (class, sex, age group), rounded to two
/// decimals. The input table is left untouched.
pub fn prepare(raw: &BaseTable) -> Result<BaseTable, DataError> {
    if raw.is_empty() {
        return Err(DataError::EmptyTable(raw.name().to_string()));
    }
    for column in REQUIRED {
        raw.require_column(column)?;
    }

    let age = col("Age").cast(DataType::Float64);
    let mut fills = vec![age.clone().fill_null(age.clone().median()).alias("Age")];
    if raw.has_column("Cabin") {
        fills.push(col("Cabin").cast(DataType::String).fill_null(lit("Unknown")));
    }
    if raw.has_column("Embarked") {
        fills.push(col("Embarked").cast(DataType::String).fill_null(lit("N/A")));
    }

    let rate = (col("Survived").cast(DataType::Float64).mean() * lit(100.0))
        .over(GROUP_COLUMNS.map(col))
        .alias("SurvivalRate");

    let mut frame = raw
        .lazy()
        .with_columns(fills)
        .with_columns([age_group(col("Age")).alias("AgeGroup")])
        .with_columns([rate])
        .collect()?;
    debug!(
        "Filled {} missing ages with the median",
        raw.frame().column("Age")?.null_count()
    );

    let rounded = frame
        .column("SurvivalRate")?
        .f64()?
        .apply_values(|v| round_to(v, 2))
        .into_series();
    frame.with_column(rounded)?;

    let table = BaseTable::new(TABLE, frame);
    info!(
        "Prepared {} passengers with {} columns",
        table.len(),
        table.frame().width()
    );
    Ok(table)
}

pub fn class_dimension() -> Dimension {
    Dimension::new("class", "Pclass", "Passenger Class")
        .option("1")
        .option("2")
        .option("3")
}

pub fn gender_dimension() -> Dimension {
    Dimension::new("gender", "Sex", "Gender")
        .option("male")
        .option("female")
}

/// The interactive survival dashboards over [`TABLE`].
pub fn dashboards() -> Vec<Dashboard> {
    let age_groups = ViewSpec::new(
        "age_group_survival",
        "Survival Rates by Age Group",
        &["AgeGroup"],
        "Survived",
        Statistic::Rate,
    )
    .labels("Age Group", "Survival Rate (%)")
    .color("skyblue")
    .dimension(class_dimension())
    .dimension(gender_dimension());

    let class_gender = ViewSpec::new(
        "class_gender",
        "Survival Rates by Class and Gender",
        &["Pclass", "Sex"],
        "Survived",
        Statistic::Mean,
    )
    .labels("Class and Gender", "Survival Rate")
    .color("lightblue")
    .dimension(class_dimension())
    .dimension(gender_dimension());

    // The gender control shows capitalised labels but filters on the
    // lowercase values stored in the table.
    let fare = PointSpec::new(
        "fare_vs_survival",
        "Scatter Plot of Fare vs Survival Status by Class",
        "Fare",
        "Survived",
    )
    .color_by("Pclass", "Class")
    .labels("Fare", "Survived")
    .tooltip("Pclass", "Passenger Class")
    .tooltip("Fare", "Fare")
    .tooltip("Survived", "Survived")
    .tooltip("Sex", "Sex")
    .tooltip("Age", "Age")
    .tooltip("Name", "Name")
    .dimension(class_dimension())
    .dimension(
        Dimension::new("gender", "Sex", "Gender")
            .labelled_option("male", "Male")
            .labelled_option("female", "Female"),
    );

    vec![
        Dashboard::aggregate(TABLE, age_groups),
        Dashboard::aggregate(TABLE, class_gender),
        Dashboard::points(TABLE, fare),
    ]
}
