use crate::metadata::MetadataExtractor;

/// Shared application state passed to all handlers.
/// The extractor owns the outbound HTTP client, built once at startup, so
/// every request reuses the same connection pool.
#[derive(Clone)]
pub struct AppState {
    pub extractor: MetadataExtractor,
}

impl AppState {
    pub fn new(extractor: MetadataExtractor) -> Self {
        AppState { extractor }
    }
}
