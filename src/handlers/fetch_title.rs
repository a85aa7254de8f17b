use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::metadata::INVALID_URL_MESSAGE;
use crate::models::ExtractionResult;
use crate::state::AppState;

// ── Query params ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FetchTitleQuery {
    pub url: Option<String>,
}

// ── Handler ────────────────────────────────────────────────────────────────

/// GET /fetchTitle?url=<encoded-url>
///
/// Fetches the page once and returns its `<title>` and meta description.
/// 400 for a missing or malformed `url`, 500 when the page cannot be fetched
/// or parsed. If the caller disconnects, axum drops this future and the
/// outbound request with it.
pub async fn fetch_title(
    State(state): State<AppState>,
    params: Result<Query<FetchTitleQuery>, QueryRejection>,
) -> AppResult<Json<ExtractionResult>> {
    let Query(params) = params.map_err(|e| {
        info!(error = %e, "Rejected malformed query string");
        AppError::InvalidInput(INVALID_URL_MESSAGE.into())
    })?;

    info!(url = params.url.as_deref().unwrap_or(""), "Fetch");

    let target = params.url.unwrap_or_default();
    let result = state.extractor.extract(&target).await?;

    Ok(Json(result))
}
