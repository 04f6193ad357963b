pub mod catalog;
pub mod config;
pub mod controller;
mod error;
pub mod http;
pub mod images;
pub mod mock;
pub mod state;

#[cfg(test)]
mod testing;

use std::future::Future;

pub use catalog::{load_catalog, CatalogLoad, ModelCatalog, ModelKind};
pub use config::ClientConfig;
pub use controller::GeneratorController;
pub use error::BackendError;
pub use http::HttpBackend;
pub use images::{DataUrl, ImageError, ImageWriter};
pub use mock::MockBackend;
pub use state::{AppState, FormState, GeneratedImage, RequestStatus};

use serde::{Deserialize, Serialize};

/// Body of `POST /api/generate`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub checkpoint_model: String,
    /// Empty when no LoRA is selected.
    pub lora_model: String,
}

/// Anything that can answer the three backend endpoints.
pub trait Backend: Send + Sync {
    /// Names of the models of `kind` the backend can serve.
    fn list_models(
        &self,
        kind: ModelKind,
    ) -> impl Future<Output = Result<Vec<String>, BackendError>> + Send;

    /// Runs one generation and returns the image URLs in display order.
    fn generate(
        &self,
        request: GenerationRequest,
    ) -> impl Future<Output = Result<Vec<String>, BackendError>> + Send;
}
