use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::{Backend, BackendError, GenerationRequest, ModelKind};

/// Scripted backend that records every generation request it receives.
pub(crate) struct FakeBackend {
    checkpoints: Vec<String>,
    loras: Vec<String>,
    failing: HashSet<ModelKind>,
    response: Mutex<Result<Vec<String>, BackendError>>,
    requests: Mutex<Vec<GenerationRequest>>,
    gate: Option<Arc<Notify>>,
    listing_gates: HashMap<ModelKind, Arc<Notify>>,
    listed: Mutex<Vec<ModelKind>>,
}

impl FakeBackend {
    pub fn new(checkpoints: &[&str], loras: &[&str]) -> Self {
        Self {
            checkpoints: checkpoints.iter().map(|s| s.to_string()).collect(),
            loras: loras.iter().map(|s| s.to_string()).collect(),
            failing: HashSet::new(),
            response: Mutex::new(Ok(Vec::new())),
            requests: Mutex::new(Vec::new()),
            gate: None,
            listing_gates: HashMap::new(),
            listed: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_listing(mut self, kind: ModelKind) -> Self {
        self.failing.insert(kind);
        self
    }

    pub fn respond_with(&self, response: Result<Vec<&str>, BackendError>) {
        *self.response.lock().unwrap() =
            response.map(|urls| urls.into_iter().map(str::to_string).collect());
    }

    /// Holds every `generate` call until the returned handle is notified.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(gate.clone());
        (self, gate)
    }

    /// Holds `list_models(kind)` until the returned handle is notified.
    pub fn gate_listing(mut self, kind: ModelKind) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.listing_gates.insert(kind, gate.clone());
        (self, gate)
    }

    /// Kinds whose listing has returned, in completion order.
    pub fn listed(&self) -> Vec<ModelKind> {
        self.listed.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Backend for FakeBackend {
    async fn list_models(&self, kind: ModelKind) -> Result<Vec<String>, BackendError> {
        if let Some(gate) = self.listing_gates.get(&kind) {
            gate.notified().await;
        }
        self.listed.lock().unwrap().push(kind);
        if self.failing.contains(&kind) {
            return Err(BackendError::Status {
                status: 500,
                message: "HTTP error! status: 500".to_string(),
            });
        }
        match kind {
            ModelKind::Checkpoints => Ok(self.checkpoints.clone()),
            ModelKind::Loras => Ok(self.loras.clone()),
        }
    }

    async fn generate(&self, request: GenerationRequest) -> Result<Vec<String>, BackendError> {
        self.requests.lock().unwrap().push(request);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.response.lock().unwrap().clone()
    }
}
