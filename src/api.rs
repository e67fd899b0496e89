//! HTTP surface for the PDF question-answering service.
//!
//! - `GET /` – Render the upload and question forms, listing the active batch's filenames.
//! - `POST /` – Either a `multipart/form-data` upload (`pdf` file fields, optionally a `query`
//!   field) or a urlencoded `query`; the page is re-rendered with the outcome.
//! - `POST /api/ask` – JSON `{"query": ...}` returning `{"answer": ...}` or `{"error": ...}`.
//! - `GET /metrics` – Ingestion and answer counters.
//!
//! Both surfaces share one [`RagApi`] implementation, so the page and the JSON API always see
//! the same active session.

use crate::metrics::MetricsSnapshot;
use crate::processing::{AskError, RagApi, Upload, loader::stored_filename};
use crate::web::{PageView, render_page};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State, rejection::JsonRejection},
    http::header::CONTENT_TYPE,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Upper bound on a single request body; PDFs routinely exceed axum's 2 MiB default.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Build the HTTP router exposing the page and the JSON API.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: RagApi + 'static,
{
    Router::new()
        .route("/", get(show_page::<S>).post(submit_page::<S>))
        .route("/api/ask", post(ask_question::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(service)
}

/// Urlencoded body of the question form.
#[derive(Deserialize)]
struct AskForm {
    #[serde(default)]
    query: String,
}

/// Request body for `POST /api/ask`.
#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    query: Option<String>,
}

/// Success response for `POST /api/ask`.
#[derive(Serialize)]
struct AskResponse {
    answer: String,
}

async fn show_page<S>(State(service): State<Arc<S>>) -> Html<String>
where
    S: RagApi,
{
    render_with_files(service.as_ref(), PageView::default()).await
}

/// Handle either form on the page, dispatching on the request content type.
async fn submit_page<S>(State(service): State<Arc<S>>, request: Request) -> Html<String>
where
    S: RagApi,
{
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    let view = if is_multipart {
        match Multipart::from_request(request, &()).await {
            Ok(multipart) => handle_multipart(service.as_ref(), multipart).await,
            Err(rejection) => error_view(None, rejection.body_text()),
        }
    } else {
        match axum::Form::<AskForm>::from_request(request, &()).await {
            Ok(axum::Form(form)) => answer_view(service.as_ref(), form.query).await,
            Err(rejection) => error_view(None, rejection.body_text()),
        }
    };

    render_with_files(service.as_ref(), view).await
}

async fn handle_multipart<S>(service: &S, mut multipart: Multipart) -> PageView
where
    S: RagApi,
{
    let mut uploads = Vec::new();
    let mut query = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(error) => return error_view(None, error.body_text()),
        };
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("pdf") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => uploads.push(Upload {
                        filename,
                        bytes: bytes.to_vec(),
                    }),
                    Err(error) => return error_view(None, error.body_text()),
                }
            }
            Some("query") => match field.text().await {
                Ok(text) => query = Some(text),
                Err(error) => return error_view(None, error.body_text()),
            },
            _ => {}
        }
    }

    let has_files = uploads
        .iter()
        .any(|upload| stored_filename(&upload.filename).is_some());
    if !has_files {
        if let Some(query) = query.filter(|value| !value.trim().is_empty()) {
            return answer_view(service, query).await;
        }
    }

    match service.ingest(uploads).await {
        Ok(outcome) => {
            tracing::info!(
                files = outcome.filenames.len(),
                pages = outcome.page_count,
                chunks = outcome.chunk_count,
                "Upload request completed"
            );
            PageView::default()
        }
        Err(error) => {
            tracing::warn!(error = %error, "Upload request failed");
            error_view(None, error.to_string())
        }
    }
}

async fn answer_view<S>(service: &S, query: String) -> PageView
where
    S: RagApi,
{
    match service.ask(&query).await {
        Ok(answer) => PageView {
            query: Some(query),
            answer: Some(answer.text),
            sources: answer.sources,
            ..PageView::default()
        },
        Err(error) => {
            log_ask_error(&error);
            error_view(Some(query), error.to_string())
        }
    }
}

fn error_view(query: Option<String>, message: String) -> PageView {
    PageView {
        query,
        error: Some(message),
        ..PageView::default()
    }
}

async fn render_with_files<S>(service: &S, mut view: PageView) -> Html<String>
where
    S: RagApi,
{
    view.filenames = service.loaded_files().await.unwrap_or_default();
    Html(render_page(&view))
}

/// Answer a question against the active session.
async fn ask_question<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError>
where
    S: RagApi,
{
    let query = match payload {
        Ok(Json(request)) => request.query.unwrap_or_default(),
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "Rejected ask payload");
            String::new()
        }
    };
    let answer = service.ask(&query).await?;
    tracing::info!(citations = answer.sources.len(), "Ask request completed");
    Ok(Json(AskResponse {
        answer: answer.text,
    }))
}

/// Return the counters collected since start-up.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: RagApi,
{
    Json(service.metrics_snapshot())
}

fn log_ask_error(error: &AskError) {
    if error.status().is_server_error() {
        tracing::error!(error = %error, "Question could not be answered");
    } else {
        tracing::debug!(error = %error, "Question rejected");
    }
}

struct AppError(AskError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        log_ask_error(&self.0);
        let body = Json(json!({ "error": self.0.to_string() }));
        (self.0.status(), body).into_response()
    }
}

impl From<AskError> for AppError {
    fn from(inner: AskError) -> Self {
        Self(inner)
    }
}
