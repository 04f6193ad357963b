use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{Backend, BackendError};

/// The two model lists the backend exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Checkpoints,
    Loras,
}

serde_plain::derive_display_from_serialize!(ModelKind);
serde_plain::derive_fromstr_from_deserialize!(ModelKind);

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Checkpoints, ModelKind::Loras];

    /// Path of the listing endpoint, relative to the backend base URL.
    pub fn endpoint(self) -> String {
        format!("api/{self}")
    }
}

/// Response body of the listing endpoints. A missing or null `models`
/// field means an empty list.
#[derive(Debug, Deserialize)]
pub(crate) struct ModelListResponse {
    #[serde(default)]
    pub models: Option<Vec<String>>,
}

impl ModelListResponse {
    pub fn into_models(self) -> Vec<String> {
        self.models.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelCatalog {
    pub checkpoints: Vec<String>,
    pub loras: Vec<String>,
}

impl ModelCatalog {
    pub fn models(&self, kind: ModelKind) -> &[String] {
        match kind {
            ModelKind::Checkpoints => &self.checkpoints,
            ModelKind::Loras => &self.loras,
        }
    }

    pub fn contains(&self, kind: ModelKind, name: &str) -> bool {
        self.models(kind).iter().any(|model| model == name)
    }
}

/// Outcome of one catalog load. Lists that failed to load stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogLoad {
    pub catalog: ModelCatalog,
    pub error: Option<String>,
}

/// Message shown when one of the listings could not be fetched.
pub fn catalog_error_message(kind: ModelKind) -> String {
    format!("Could not load {kind}. Ensure backend is running.")
}

/// Fetches both model lists concurrently and waits for both to settle.
///
/// Failures are logged and folded into [`CatalogLoad::error`]; they never
/// abort the other fetch. When both fail the LoRA message is the one kept.
pub async fn load_catalog<B: Backend>(backend: &B) -> CatalogLoad {
    let (checkpoints, loras) = tokio::join!(
        fetch_models(backend, ModelKind::Checkpoints),
        fetch_models(backend, ModelKind::Loras),
    );

    let mut load = CatalogLoad::default();
    for (kind, result) in [(ModelKind::Checkpoints, checkpoints), (ModelKind::Loras, loras)] {
        match result {
            Ok(models) => match kind {
                ModelKind::Checkpoints => load.catalog.checkpoints = models,
                ModelKind::Loras => load.catalog.loras = models,
            },
            Err(_) => load.error = Some(catalog_error_message(kind)),
        }
    }
    load
}

async fn fetch_models<B: Backend>(
    backend: &B,
    kind: ModelKind,
) -> Result<Vec<String>, BackendError> {
    match backend.list_models(kind).await {
        Ok(models) => {
            debug!(%kind, count = models.len(), "loaded model list");
            Ok(models)
        }
        Err(err) => {
            error!(%kind, error = %err, "failed to fetch model list");
            Err(err)
        }
    }
}
