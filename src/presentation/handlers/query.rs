use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

use crate::application::ports::{LlmClient, VectorStore};
use crate::infrastructure::observability::sanitize_prompt;
use crate::presentation::state::AppState;

pub const NO_QUERY_PROVIDED: &str = "No query provided";

#[derive(Serialize)]
pub struct QueryResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceNode>>,
}

#[derive(Serialize)]
pub struct SourceNode {
    pub node: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub score: f32,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Body is taken as raw JSON so a missing or mistyped `query` answers with
/// the same 400 as an empty one.
#[tracing::instrument(skip(state, payload))]
pub async fn query_handler<L, V>(
    State(state): State<AppState<L, V>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response
where
    L: LlmClient + ?Sized + 'static,
    V: VectorStore + ?Sized + 'static,
{
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "Rejected query body");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let Some(question) = body
        .get("query")
        .and_then(Value::as_str)
        .filter(|q| !q.trim().is_empty())
    else {
        return error_response(StatusCode::BAD_REQUEST, NO_QUERY_PROVIDED.to_string());
    };
    let include_sources = body
        .get("include_sources")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    tracing::debug!(question = %sanitize_prompt(question), "Processing query");

    match state.retrieval_service.query(question).await {
        Ok(response) => {
            tracing::info!(sources_count = response.sources.len(), "Query successful");
            let sources = include_sources.then(|| {
                response
                    .sources
                    .into_iter()
                    .map(|s| SourceNode {
                        node: s.text,
                        source: s.source,
                        score: s.score,
                    })
                    .collect()
            });

            (
                StatusCode::OK,
                Json(QueryResponse {
                    response: response.answer,
                    sources,
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Query failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Query failed: {}", e),
            )
        }
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}
