//! HTTP routes for interactive mode.

use crate::error::DataError;
use crate::report::render_dashboard_page;
use crate::view::{Catalog, ChartPayload, DashboardInfo, Session};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

/// Shared server state.
pub struct AppState {
    catalog: Arc<Catalog>,
    sessions: Mutex<HashMap<Uuid, Session>>,
    /// Sessions unused for this long are dropped when a new one is created.
    session_ttl: Duration,
    page: String,
}

impl AppState {
    pub fn new(catalog: Catalog, session_ttl: Duration) -> Arc<Self> {
        let page = render_dashboard_page(&catalog.infos());
        Arc::new(Self {
            catalog: Arc::new(catalog),
            sessions: Mutex::new(HashMap::new()),
            session_ttl,
            page,
        })
    }
}

/// Errors returned to API clients as `{ "error": ... }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown session {0}")]
    UnknownSession(Uuid),
    #[error("unknown chart \"{0}\"")]
    UnknownChart(String),
    #[error(transparent)]
    Data(#[from] DataError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::UnknownSession(_) | ApiError::UnknownChart(_) => StatusCode::NOT_FOUND,
            ApiError::Data(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct SessionCreated {
    session: Uuid,
    charts: BTreeMap<String, ChartPayload>,
}

/// Body of a selection change.
#[derive(Debug, Deserialize)]
pub struct SelectionChange {
    pub dimension: String,
    pub value: String,
}

async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(state.page.clone())
}

async fn list_dashboards(State(state): State<Arc<AppState>>) -> Json<Vec<DashboardInfo>> {
    Json(state.catalog.infos())
}

async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionCreated>, ApiError> {
    let session = state.catalog.new_session()?;
    let created = SessionCreated {
        session: session.id(),
        charts: session.payloads(),
    };

    let mut sessions = state.sessions.lock().await;
    let before = sessions.len();
    sessions.retain(|_, s| !s.is_idle(state.session_ttl));
    if sessions.len() < before {
        info!("Expired {} idle sessions", before - sessions.len());
    }
    sessions.insert(session.id(), session);
    debug!("{} live sessions", sessions.len());

    Ok(Json(created))
}

async fn chart_state(
    State(state): State<Arc<AppState>>,
    Path((id, chart)): Path<(Uuid, String)>,
) -> Result<Json<ChartPayload>, ApiError> {
    let mut sessions = state.sessions.lock().await;
    let session = sessions.get_mut(&id).ok_or(ApiError::UnknownSession(id))?;
    session.touch();
    let payload = session
        .chart(&chart)
        .map(|c| c.payload())
        .ok_or_else(|| ApiError::UnknownChart(chart.clone()))?;

    Ok(Json(payload))
}

async fn change_selection(
    State(state): State<Arc<AppState>>,
    Path((id, chart)): Path<(Uuid, String)>,
    Json(change): Json<SelectionChange>,
) -> Result<Json<ChartPayload>, ApiError> {
    debug!(
        "Session {}: {} {} = {}",
        id, chart, change.dimension, change.value
    );

    // The recompute runs to completion while the lock is held.
    let payload = {
        let mut sessions = state.sessions.lock().await;
        let session = sessions.get_mut(&id).ok_or(ApiError::UnknownSession(id))?;
        session.touch();
        session
            .select(&chart, &change.dimension, &change.value)
            .ok_or_else(|| ApiError::UnknownChart(chart.clone()))?
    };

    Ok(Json(payload))
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/dashboards", get(list_dashboards))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}/charts/{chart}", get(chart_state))
        .route(
            "/api/sessions/{id}/charts/{chart}/selection",
            post(change_selection),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the dashboards until the process is stopped.
pub async fn run_server(state: Arc<AppState>, addr: SocketAddr, open_browser: bool) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let url = format!("http://{}", listener.local_addr()?);

    if open_browser {
        info!("Opening browser at {}", url);
        // Opener failures are ignored.
        #[cfg(target_os = "macos")]
        let _ = std::process::Command::new("open").arg(&url).spawn();
        #[cfg(target_os = "linux")]
        let _ = std::process::Command::new("xdg-open").arg(&url).spawn();
    }

    println!("📊 Dashboards running at {}", url);
    println!("   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BaseTable, Dimension, Statistic};
    use crate::view::{Dashboard, ViewSpec};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use polars::prelude::df;
    use serde_json::Value;
    use tower::ServiceExt;

    fn catalog() -> Catalog {
        let frame = df!(
            "class" => [1i64, 1, 2, 3],
            "gender" => ["male", "female", "male", "male"],
            "survived" => [1i64, 1, 0, 0],
        )
        .unwrap();
        let mut catalog = Catalog::new();
        catalog.add_table(BaseTable::new("passengers", frame));
        catalog.add_dashboard(Dashboard::aggregate(
            "passengers",
            ViewSpec::new("by_class", "Survival by Class", &["class"], "survived", Statistic::Rate)
                .dimension(Dimension::new("class", "class", "Class").option("1").option("2").option("3"))
                .dimension(Dimension::new("gender", "gender", "Gender").option("male").option("female")),
        ));
        catalog
    }

    fn state() -> Arc<AppState> {
        AppState::new(catalog(), Duration::from_secs(1800))
    }

    async fn session_count(state: &AppState) -> usize {
        state.sessions.lock().await.len()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn new_session(app: &Router) -> (String, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/api/sessions")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        (body["session"].as_str().unwrap().to_string(), body)
    }

    #[tokio::test]
    async fn test_index_serves_page() {
        let app = router(state());
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("data-chart=\"by_class\""));
    }

    #[tokio::test]
    async fn test_list_dashboards() {
        let app = router(state());
        let request = Request::builder().uri("/api/dashboards").body(Body::empty()).unwrap();
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "by_class");
        assert_eq!(body[0]["dimensions"][1]["options"][0]["value"], "male");
    }

    #[tokio::test]
    async fn test_session_selection_flow() {
        let state = state();
        let app = router(state.clone());
        let (id, created) = new_session(&app).await;
        assert_eq!(created["charts"]["by_class"]["rows"], 3);
        assert_eq!(session_count(&state).await, 1);

        let uri = format!("/api/sessions/{}/charts/by_class/selection", id);
        send(app.clone(), post_json(&uri, serde_json::json!({ "dimension": "gender", "value": "female" }))).await;
        let (status, body) = send(
            app,
            post_json(&uri, serde_json::json!({ "dimension": "class", "value": "1" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["categories"], serde_json::json!(["1"]));
        assert_eq!(body["selection"]["gender"], "female");
        assert_eq!(body["figure"]["data"][0]["y"], serde_json::json!([100.0]));
        assert_eq!(body["state"], "idle");
    }

    #[tokio::test]
    async fn test_chart_state_returns_current_selection() {
        let app = router(state());
        let (id, _) = new_session(&app).await;
        let uri = format!("/api/sessions/{}/charts/by_class", id);
        send(
            app.clone(),
            post_json(
                &format!("{}/selection", uri),
                serde_json::json!({ "dimension": "class", "value": "2" }),
            ),
        )
        .await;

        let request = Request::builder().uri(&uri).body(Body::empty()).unwrap();
        let (status, body) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["selection"]["class"], "2");
        assert_eq!(body["rows"], 1);

        let missing = format!("/api/sessions/{}/charts/missing", id);
        let request = Request::builder().uri(&missing).body(Body::empty()).unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_idle_sessions_expire_on_create() {
        let state = AppState::new(catalog(), Duration::ZERO);
        let app = router(state.clone());

        let (first, _) = new_session(&app).await;
        let (second, _) = new_session(&app).await;
        assert_ne!(first, second);
        assert_eq!(session_count(&state).await, 1);

        let uri = format!("/api/sessions/{}/charts/by_class", first);
        let request = Request::builder().uri(&uri).body(Body::empty()).unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_active_sessions_survive_create() {
        let state = state();
        let app = router(state.clone());
        new_session(&app).await;
        new_session(&app).await;
        assert_eq!(session_count(&state).await, 2);
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let app = router(state());
        let uri = format!("/api/sessions/{}/charts/by_class/selection", Uuid::new_v4());
        let (status, body) = send(
            app,
            post_json(&uri, serde_json::json!({ "dimension": "class", "value": "1" })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("unknown session"));
    }

    #[tokio::test]
    async fn test_unknown_chart_is_404() {
        let app = router(state());
        let (id, _) = new_session(&app).await;
        let uri = format!("/api/sessions/{}/charts/missing/selection", id);
        let (status, _) = send(
            app,
            post_json(&uri, serde_json::json!({ "dimension": "class", "value": "1" })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
