/// Request handlers for the query API.
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::generator::GenerationError;
use crate::pipeline::{QueryError, RagPipeline};

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn error_response(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            detail: detail.into(),
        }),
    )
}

/// Status code for each failure a query can hit.
pub fn status_for(err: &QueryError) -> StatusCode {
    match err {
        QueryError::EmptyQuery | QueryError::EmptyStore => StatusCode::BAD_REQUEST,
        QueryError::Generation(GenerationError::Quota(_)) => StatusCode::TOO_MANY_REQUESTS,
        QueryError::Generation(GenerationError::Network(_)) => StatusCode::BAD_GATEWAY,
        QueryError::Retrieval(_) | QueryError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

pub async fn query(
    State(pipeline): State<Arc<RagPipeline>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let result = tokio::task::spawn_blocking(move || pipeline.answer(&req.query))
        .await
        .map_err(|e| {
            error!("query task panicked: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "query task failed")
        })?;

    match result {
        Ok(answer) => Ok(Json(QueryResponse { answer })),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                error!("query failed: {e}");
            } else {
                warn!("query rejected: {e}");
            }
            Err(error_response(status, e.to_string()))
        }
    }
}
