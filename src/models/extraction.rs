use serde::{Deserialize, Serialize};

/// Title and meta-description extracted from a page, returned by
/// `GET /fetchTitle`.
///
/// Both fields are always present; absent elements are filled in according to
/// the configured [`FallbackPolicy`](crate::metadata::FallbackPolicy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub title: String,
    pub description: String,
}
