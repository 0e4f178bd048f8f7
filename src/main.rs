//! chartdeck - charts and filterable dashboards from CSV datasets
//!
//! Loads the passenger survival and rental listings datasets, computes
//! grouped aggregates and renders them as Plotly charts. Charts are either
//! exported as standalone HTML documents or served as dashboards whose
//! dropdown filters recompute the aggregates live.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (missing dataset, bad column, config, I/O, etc.)

mod analysis;
mod chart;
mod cli;
mod config;
mod data;
mod error;
mod models;
mod report;
mod server;
mod view;

use anyhow::{bail, Context, Result};
use chart::Figure;
use cli::Args;
use config::{Config, CONFIG_FILE};
use std::net::SocketAddr;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use view::Catalog;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration before logging so the file can turn on verbose output
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(config.log_level(&args));

    info!("chartdeck v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {:?}", config);

    if let Err(e) = run(&args, config).await {
        error!("Run failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .chartdeck.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to set dataset paths, the output directory and the server address.");
    Ok(())
}

/// Initialize logging at the merged verbosity level.
fn init_logging(level: Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Load the datasets, then export or serve.
async fn run(args: &Args, config: Config) -> Result<()> {
    if config.data.titanic.is_none() && config.data.listings.is_none() {
        bail!("No dataset given. Pass --titanic and/or --listings, or set them in [data] of {}", CONFIG_FILE);
    }

    let catalog = build_catalog(&config)?;

    if args.serve {
        if catalog.dashboards().is_empty() {
            bail!("Interactive mode needs the passenger dataset (--titanic)");
        }
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid listen address {}:{}",
                    config.server.host, config.server.port
                )
            })?;
        let ttl = Duration::from_secs(config.server.session_ttl_secs);
        let state = server::AppState::new(catalog, ttl);
        return server::run_server(state, addr, config.server.open_browser).await;
    }

    export(&config, &catalog)
}

/// Load every configured dataset and register the survival dashboards.
fn build_catalog(config: &Config) -> Result<Catalog> {
    let mut catalog = Catalog::new();

    if let Some(ref path) = config.data.titanic {
        println!("📥 Loading passengers: {}", path.display());
        let raw = data::load_csv(path, "titanic_raw")?;
        let table = data::titanic::prepare(&raw)
            .with_context(|| format!("Failed to prepare {}", path.display()))?;
        catalog.add_table(table);
        for dashboard in data::titanic::dashboards() {
            catalog.add_dashboard(dashboard);
        }
    }

    if let Some(ref path) = config.data.listings {
        println!("📥 Loading listings: {}", path.display());
        catalog.add_table(data::load_csv(path, data::listings::TABLE)?);
    }

    Ok(catalog)
}

/// Build every static chart and write it to the output directory.
fn export(config: &Config, catalog: &Catalog) -> Result<()> {
    let start_time = Instant::now();
    let mut charts: Vec<(String, Figure)> = Vec::new();

    // Dashboards export their unfiltered state.
    if !catalog.dashboards().is_empty() {
        let session = catalog.new_session()?;
        for chart in session.charts() {
            charts.push((chart.name().to_string(), chart.figure()));
        }
    }

    if let Some(listings) = catalog.table(data::listings::TABLE) {
        charts.extend(data::listings::static_charts(listings)?);
        if let Some(price) = data::listings::mean_price(listings)? {
            info!("Mean listing price: {:.2}", price);
        }
    }

    let before = charts.len();
    charts.retain(|(name, _)| config.export.includes(name));
    if charts.len() < before {
        debug!("Skipped {} charts not in [export] include", before - charts.len());
    }
    if charts.is_empty() {
        warn!("No charts selected for export");
    }

    println!("\n📝 Writing {} charts...", charts.len());
    let written = report::export_charts(
        &config.general.output_dir,
        &charts,
        config.export.show_progress,
    )?;

    println!("\n📊 Export Summary:");
    for path in &written {
        println!("   📄 {}", path.display());
    }
    println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());
    println!(
        "\n✅ Export complete! Charts saved to: {}",
        config.general.output_dir.display()
    );

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so problems go to stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
