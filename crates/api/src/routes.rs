use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use extract::{ExtractionResult, RowOutcome, SearchResult};
use pipeline::{
    export, BatchReport, BatchRequest, BatchState, LoadedSource, SourceKind, RESULTS_FILE_NAME,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
struct TablePreview {
    origin: &'static str,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    row_count: usize,
}

impl TablePreview {
    fn from_source(source: &LoadedSource) -> Self {
        Self {
            origin: match source.kind {
                SourceKind::Csv => "csv",
                SourceKind::Sheet(_) => "sheet",
            },
            columns: source.table.columns().to_vec(),
            rows: source.table.rows().iter().map(|r| r.values.clone()).collect(),
            row_count: source.table.len(),
        }
    }
}

#[derive(Deserialize)]
struct SheetRequest {
    url: String,
}

#[derive(Deserialize)]
struct ExtractRequest {
    column: String,
    #[serde(default = "default_rows")]
    rows: usize,
    template: String,
    #[serde(default)]
    export_to_sheet: bool,
}

fn default_rows() -> usize {
    1
}

#[derive(Serialize)]
struct ResultView {
    entity: String,
    prompt: String,
    extracted_data: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&ExtractionResult> for ResultView {
    fn from(result: &ExtractionResult) -> Self {
        let (status, error) = match &result.outcome {
            RowOutcome::Extracted { .. } => ("extracted", None),
            RowOutcome::NoData => ("no_data", None),
            RowOutcome::Failed(failure) => (
                "failed",
                Some(format!(
                    "Error in API call for {}: {}",
                    result.entity, failure.message
                )),
            ),
        };

        Self {
            entity: result.entity.clone(),
            prompt: result.prompt.clone(),
            extracted_data: result.extracted_data().to_string(),
            status,
            error,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ExportStatus {
    Exported {
        worksheet: String,
        created: bool,
        rows_written: usize,
    },
    Failed {
        error: String,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Serialize)]
struct ExtractResponse {
    batch_id: Uuid,
    rows: usize,
    failed: usize,
    results: Vec<ResultView>,
    searches: Vec<SearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    export: Option<ExportStatus>,
}

/// Marks the session's batch as running. Unless [`RunningBatch::finish`] is
/// called, dropping it puts the session back to idle, which also covers a
/// handler future dropped on client disconnect.
struct RunningBatch<'a> {
    state: &'a AppState,
    finished: bool,
}

impl<'a> RunningBatch<'a> {
    fn start(state: &'a AppState, total: usize) -> Result<Self, ApiError> {
        let mut batch = state.batch();
        if batch.is_running() {
            return Err(ApiError::Conflict("a batch is already running".to_string()));
        }
        *batch = BatchState::Running { total, completed: 0 };

        Ok(Self {
            state,
            finished: false,
        })
    }

    fn finish(mut self, report: BatchReport) {
        *self.state.batch() = BatchState::Done { report };
        self.finished = true;
    }
}

impl Drop for RunningBatch<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self.state.batch() = BatchState::Idle;
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/source", get(get_source))
        .route("/source/csv", post(load_csv))
        .route("/source/sheet", post(load_sheet))
        .route("/extract", post(run_extraction).get(get_batch))
        .route("/extract/results.csv", get(download_results))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

async fn get_source(State(state): State<Arc<AppState>>) -> Result<Json<TablePreview>, ApiError> {
    let source = state.source.read().await;
    source
        .as_ref()
        .map(|s| Json(TablePreview::from_source(s)))
        .ok_or_else(|| ApiError::NotFound("no data loaded".to_string()))
}

async fn replace_source(state: &AppState, loaded: LoadedSource) -> Result<TablePreview, ApiError> {
    let running = state.batch().is_running();
    if running {
        return Err(ApiError::Conflict("a batch is running".to_string()));
    }

    let preview = TablePreview::from_source(&loaded);
    *state.source.write().await = Some(loaded);
    *state.batch() = BatchState::Idle;
    Ok(preview)
}

async fn load_csv(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<TablePreview>, ApiError> {
    let loaded = LoadedSource::from_csv(&body)?;
    Ok(Json(replace_source(&state, loaded).await?))
}

async fn load_sheet(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SheetRequest>,
) -> Result<Json<TablePreview>, ApiError> {
    let loaded = LoadedSource::from_sheet(&req.url, &state.config).await?;
    Ok(Json(replace_source(&state, loaded).await?))
}

async fn get_batch(State(state): State<Arc<AppState>>) -> Json<BatchState> {
    let batch = state.batch().clone();
    Json(batch)
}

async fn run_extraction(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, ApiError> {
    let source = state.source.read().await;
    let source = source
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("no data loaded; upload a CSV or link a Google Sheet first".to_string()))?;

    let request = BatchRequest {
        column: req.column,
        rows: req.rows,
        template: req.template,
    };
    let total = request.validate(&source.table)?;

    let running = RunningBatch::start(&state, total)?;

    let batch_id = Uuid::new_v4();
    info!(%batch_id, rows = total, "Search and extract requested");

    let report = state
        .orchestrator
        .run_with_progress(&source.table, &request, |progress| {
            *state.batch() = BatchState::Running {
                total: progress.total,
                completed: progress.completed,
            };
        })
        .await?;
    running.finish(report.clone());

    let export = if req.export_to_sheet {
        Some(match source.sheet() {
            Some(sheet) => {
                match export::export_to_worksheet(sheet, &state.config.export.worksheet, &report.results).await {
                    Ok(summary) => ExportStatus::Exported {
                        worksheet: summary.worksheet,
                        created: summary.created,
                        rows_written: summary.rows_written,
                    },
                    Err(e) => ExportStatus::Failed {
                        error: e.to_string(),
                    },
                }
            }
            None => ExportStatus::Skipped {
                reason: "source is not a Google Sheet".to_string(),
            },
        })
    } else {
        None
    };

    Ok(Json(ExtractResponse {
        batch_id,
        rows: report.results.len(),
        failed: report.failed_rows(),
        results: report.results.iter().map(ResultView::from).collect(),
        searches: report.searches,
        export,
    }))
}

async fn download_results(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let results = match &*state.batch() {
        BatchState::Done { report } => report.results.clone(),
        _ => return Err(ApiError::NotFound("no extracted results yet".to_string())),
    };

    let csv = export::to_csv(&results).map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", RESULTS_FILE_NAME),
            ),
        ],
        csv,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use mockito::{Matcher, Server, ServerGuard};
    use pipeline::config::ApiKey;
    use pipeline::AppConfig;
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use std::time::Duration;
    use tower::ServiceExt;

    const CSV: &str = "company,city\nAcme,Pune\nGlobex,Delhi\nInitech,Mumbai\n";

    const SHEET_URL: &str = "https://docs.google.com/spreadsheets/d/abc123/edit#gid=0";

    fn config(serp_url: String, groq_url: String) -> AppConfig {
        let mut config = AppConfig::default();
        config.search.base_url = serp_url;
        config.search.api_key = ApiKey::new("serp-key");
        config.llm.base_url = groq_url;
        config.llm.api_key = ApiKey::new("groq-key");
        config
    }

    fn state(serp: &ServerGuard, groq: &ServerGuard) -> Arc<AppState> {
        Arc::new(AppState::new(config(serp.url(), groq.url())))
    }

    fn write_temp(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("service_account_{}.json", Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Test service-account key whose token endpoint is `token_uri`.
    fn key_file(token_uri: String) -> PathBuf {
        let mut key: Value =
            serde_json::from_str(include_str!("../../ingest/testdata/service_account.json")).unwrap();
        key["token_uri"] = json!(token_uri);
        write_temp(&key.to_string())
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_csv(data: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/source/csv")
            .body(Body::from(data.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn mock_providers(serp: &mut ServerGuard, groq: &mut ServerGuard) {
        serp.mock("GET", "/search.json")
            .match_query(Matcher::Regex("Globex".into()))
            .with_status(503)
            .with_body("quota exceeded")
            .create_async()
            .await;
        serp.mock("GET", "/search.json")
            .match_query(Matcher::Regex("Acme|Initech".into()))
            .with_status(200)
            .with_body(r#"{"organic_results":[{"snippet":"Write to hello@example.test"}]}"#)
            .create_async()
            .await;
        groq.mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":" hello@example.test\n"}}]}"#)
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn test_health() {
        let (serp, groq) = (Server::new_async().await, Server::new_async().await);
        let (status, body) = send(&state(&serp, &groq), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_csv_upload_returns_preview() {
        let (serp, groq) = (Server::new_async().await, Server::new_async().await);
        let state = state(&serp, &groq);

        let (status, body) = send(&state, post_csv(CSV)).await;
        assert_eq!(status, StatusCode::OK);

        let preview: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(preview["origin"], "csv");
        assert_eq!(preview["columns"], json!(["company", "city"]));
        assert_eq!(preview["row_count"], 3);

        let (status, _) = send(&state, get("/source")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_csv_is_bad_request() {
        let (serp, groq) = (Server::new_async().await, Server::new_async().await);
        let (status, _) = send(&state(&serp, &groq), post_csv("a,b\n1,2,3\n")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_extract_without_source() {
        let (serp, groq) = (Server::new_async().await, Server::new_async().await);
        let request = post_json(
            "/extract",
            json!({"column": "company", "rows": 1, "template": "x {company}"}),
        );
        let (status, _) = send(&state(&serp, &groq), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_column_is_rejected() {
        let (serp, groq) = (Server::new_async().await, Server::new_async().await);
        let state = state(&serp, &groq);
        send(&state, post_csv(CSV)).await;

        let request = post_json(
            "/extract",
            json!({"column": "email", "rows": 1, "template": "x {company}"}),
        );
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_batch_isolates_failures_and_offers_download() {
        let (mut serp, mut groq) = (Server::new_async().await, Server::new_async().await);
        mock_providers(&mut serp, &mut groq).await;
        let state = state(&serp, &groq);
        send(&state, post_csv(CSV)).await;

        let request = post_json(
            "/extract",
            json!({
                "column": "company",
                "rows": 3,
                "template": "Extract the email address of {company}",
                "export_to_sheet": true
            }),
        );
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);

        let response: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(response["rows"], 3);
        assert_eq!(response["failed"], 1);

        let results = response["results"].as_array().unwrap();
        assert_eq!(results[0]["entity"], "Acme");
        assert_eq!(results[0]["extracted_data"], "hello@example.test");
        assert_eq!(results[1]["extracted_data"], "API error occurred");
        assert_eq!(results[1]["status"], "failed");
        assert!(results[1]["error"].as_str().unwrap().starts_with("Error in API call for Globex"));
        assert_eq!(results[2]["entity"], "Initech");
        assert_eq!(results[2]["status"], "extracted");

        // CSV sources cannot be written back
        assert_eq!(response["export"]["status"], "skipped");

        let (status, body) = send(&state, get("/extract")).await;
        assert_eq!(status, StatusCode::OK);
        let batch: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(batch["state"], "done");

        let response = router(state.clone())
            .oneshot(get("/extract/results.csv"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"extracted_results.csv\""
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let csv = String::from_utf8(body.to_vec()).unwrap();
        let records = export::parse_csv(&csv).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].extracted_data, "API error occurred");
    }

    #[tokio::test]
    async fn test_download_before_batch() {
        let (serp, groq) = (Server::new_async().await, Server::new_async().await);
        let (status, _) = send(&state(&serp, &groq), get("/extract/results.csv")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reload_resets_batch() {
        let (mut serp, mut groq) = (Server::new_async().await, Server::new_async().await);
        mock_providers(&mut serp, &mut groq).await;
        let state = state(&serp, &groq);
        send(&state, post_csv(CSV)).await;
        send(
            &state,
            post_json(
                "/extract",
                json!({"column": "company", "template": "Extract the email address of {company}"}),
            ),
        )
        .await;
        assert!(matches!(*state.batch(), BatchState::Done { .. }));

        send(&state, post_csv(CSV)).await;
        assert!(matches!(*state.batch(), BatchState::Idle));
    }

    #[tokio::test]
    async fn test_blank_template_runs_every_row() {
        let (mut serp, mut groq) = (Server::new_async().await, Server::new_async().await);
        serp.mock("GET", "/search.json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"organic_results":[]}"#)
            .create_async()
            .await;
        groq.mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":""}}]}"#)
            .create_async()
            .await;
        let state = state(&serp, &groq);
        send(&state, post_csv(CSV)).await;

        let request = post_json("/extract", json!({"column": "company", "rows": 2, "template": ""}));
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);

        let response: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(response["rows"], 2);
        assert_eq!(response["results"][1]["extracted_data"], "No data available");
    }

    #[tokio::test]
    async fn test_abandoned_batch_releases_session() {
        // Accepts search connections and never answers them
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let groq = Server::new_async().await;
        let state = Arc::new(AppState::new(config(format!("http://{}", addr), groq.url())));
        send(&state, post_csv(CSV)).await;

        let stalled = router(state.clone()).oneshot(post_json(
            "/extract",
            json!({"column": "company", "template": "Extract the email address of {company}"}),
        ));
        assert!(tokio::time::timeout(Duration::from_millis(300), stalled).await.is_err());

        assert!(matches!(*state.batch(), BatchState::Idle));
        let (status, _) = send(&state, post_csv(CSV)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unreadable_key_file_is_unauthorized() {
        let (serp, groq) = (Server::new_async().await, Server::new_async().await);
        let mut config = config(serp.url(), groq.url());
        config.sheets.credentials_file = write_temp("not a key");
        let state = Arc::new(AppState::new(config));

        let (status, body) = send(&state, post_json("/source/sheet", json!({"url": SHEET_URL}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let error: Value = serde_json::from_slice(&body).unwrap();
        assert!(error["error"].as_str().unwrap().contains("service account key"));
    }

    #[tokio::test]
    async fn test_sheet_export_failure_keeps_results() {
        let (mut serp, mut groq) = (Server::new_async().await, Server::new_async().await);
        mock_providers(&mut serp, &mut groq).await;

        let mut google = Server::new_async().await;
        google
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token":"sheet-token","token_type":"Bearer","expires_in":3600}"#)
            .create_async()
            .await;
        google
            .mock("GET", "/v4/spreadsheets/abc123")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer sheet-token")
            .with_status(200)
            .with_body(
                json!({"sheets": [{"properties": {
                    "sheetId": 0,
                    "title": "Sheet1",
                    "index": 0,
                    "gridProperties": {"rowCount": 1000, "columnCount": 26}
                }}]})
                .to_string(),
            )
            .create_async()
            .await;
        google
            .mock("GET", Matcher::Regex(r"^/v4/spreadsheets/abc123/values/.*Sheet1.*$".to_string()))
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"values":[["company","city"],["Acme","Pune"],["Globex","Delhi"]]}"#)
            .create_async()
            .await;
        google
            .mock("POST", "/v4/spreadsheets/abc123:batchUpdate")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        google
            .mock("POST", Matcher::Regex(r":clear$".to_string()))
            .with_status(500)
            .with_body("backend error")
            .create_async()
            .await;

        let mut config = config(serp.url(), groq.url());
        config.sheets.base_url = format!("{}/v4/spreadsheets", google.url());
        config.sheets.credentials_file = key_file(format!("{}/token", google.url()));
        let state = Arc::new(AppState::new(config));

        let (status, body) = send(&state, post_json("/source/sheet", json!({"url": SHEET_URL}))).await;
        assert_eq!(status, StatusCode::OK);
        let preview: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(preview["origin"], "sheet");
        assert_eq!(preview["row_count"], 2);

        let request = post_json(
            "/extract",
            json!({
                "column": "company",
                "rows": 1,
                "template": "Extract the email address of {company}",
                "export_to_sheet": true
            }),
        );
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);

        let response: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(response["results"][0]["extracted_data"], "hello@example.test");
        assert_eq!(response["export"]["status"], "failed");
        assert!(!response["export"]["error"].as_str().unwrap().is_empty());

        let (status, body) = send(&state, get("/extract/results.csv")).await;
        assert_eq!(status, StatusCode::OK);
        let records = export::parse_csv(std::str::from_utf8(&body).unwrap()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entity, "Acme");
    }
}
