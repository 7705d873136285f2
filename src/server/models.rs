use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: String,
    pub(crate) service: String,
    pub(crate) translation_api: String,
    pub(crate) font_available: bool,
    pub(crate) endpoints: Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
