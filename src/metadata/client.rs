use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};
use url::Url;

use super::{MetadataSource, INVALID_URL_MESSAGE};
use crate::error::{AppError, AppResult};
use crate::models::ExtractionResult;

/// Calls a remote `GET /fetchTitle?url=...` endpoint, the way bookmark
/// clients reach a deployed extraction service.
#[derive(Clone, Debug)]
pub struct MetadataClient {
    client: ReqwestClient,
    endpoint: Url,
}

impl MetadataClient {
    /// `endpoint` is the full URL of the `fetchTitle` route.
    pub fn new(client: ReqwestClient, endpoint: &str) -> AppResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|_| AppError::InvalidInput("Invalid metadata endpoint URL".into()))?;
        Ok(MetadataClient { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl MetadataSource for MetadataClient {
    async fn fetch(&self, target_url: &str) -> AppResult<ExtractionResult> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("url", target_url)])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = ?e, endpoint = %self.endpoint, "Failed to reach metadata endpoint");
                AppError::Fetch(e.to_string())
            })?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::BAD_REQUEST => {
                return Err(AppError::InvalidInput(INVALID_URL_MESSAGE.into()));
            }
            status => {
                tracing::warn!(%status, url = %target_url, "Metadata endpoint returned an error");
                return Err(AppError::Fetch(format!("metadata endpoint returned {status}")));
            }
        }

        response.json::<ExtractionResult>().await.map_err(|e| {
            tracing::warn!(error = ?e, "Metadata endpoint returned an unexpected body");
            AppError::Parse(e.to_string())
        })
    }
}
