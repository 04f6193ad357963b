use crate::{GenerationRequest, ModelCatalog};

pub const DEFAULT_PROMPT: &str = "A pixelated knight with sword, 16-bit style";
pub const DEFAULT_NEGATIVE_PROMPT: &str = "blurry, low quality, modern, realistic";

/// What the user has typed or selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    pub prompt: String,
    pub negative_prompt: String,
    /// Empty until the user picks a checkpoint.
    pub checkpoint_model: String,
    /// Empty means no LoRA.
    pub lora_model: String,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
            checkpoint_model: String::new(),
            lora_model: String::new(),
        }
    }
}

impl FormState {
    /// Presence checks applied when Generate is triggered.
    pub fn is_submittable(&self) -> bool {
        !self.prompt.is_empty() && !self.checkpoint_model.is_empty()
    }

    pub fn to_request(&self) -> GenerationRequest {
        GenerationRequest {
            prompt: self.prompt.clone(),
            negative_prompt: self.negative_prompt.clone(),
            checkpoint_model: self.checkpoint_model.clone(),
            lora_model: self.lora_model.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// Zero-based position in the response.
    pub id: usize,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Idle,
    LoadingModels,
    Generating,
    Succeeded,
    Failed,
}

/// Everything the view renders. Owned by [`crate::GeneratorController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub form: FormState,
    pub catalog: ModelCatalog,
    pub models_loading: bool,
    pub models_error: Option<String>,
    pub generating: bool,
    pub images: Vec<GeneratedImage>,
    pub error: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            form: FormState::default(),
            catalog: ModelCatalog::default(),
            // The catalog load starts as soon as the view exists.
            models_loading: true,
            models_error: None,
            generating: false,
            images: Vec::new(),
            error: None,
        }
    }
}

impl AppState {
    pub fn status(&self) -> RequestStatus {
        if self.generating {
            RequestStatus::Generating
        } else if self.models_loading {
            RequestStatus::LoadingModels
        } else if self.error.is_some() {
            RequestStatus::Failed
        } else if !self.images.is_empty() {
            RequestStatus::Succeeded
        } else {
            RequestStatus::Idle
        }
    }

    /// Whether the Generate button is enabled.
    pub fn generate_enabled(&self) -> bool {
        !self.form.checkpoint_model.is_empty() && !self.generating && !self.models_loading
    }
}
