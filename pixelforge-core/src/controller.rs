use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::catalog::load_catalog;
use crate::{AppState, Backend, FormState, GeneratedImage};

/// Owns the view state and the backend, and is the only thing that mutates
/// the state: form edits, the catalog load and generation.
///
/// State changes are published on a [`watch`] channel so a view can redraw
/// while a request is in flight.
pub struct GeneratorController<B> {
    backend: B,
    state: watch::Sender<AppState>,
}

/// Clears an in-flight flag when dropped, so every exit path (including a
/// dropped future) settles the state.
struct Settle<'a> {
    state: &'a watch::Sender<AppState>,
    clear: fn(&mut AppState),
}

impl Drop for Settle<'_> {
    fn drop(&mut self) {
        self.state.send_modify(self.clear);
    }
}

impl<B: Backend> GeneratorController<B> {
    pub fn new(backend: B) -> Self {
        Self::with_form(backend, FormState::default())
    }

    pub fn with_form(backend: B, form: FormState) -> Self {
        let (state, _) = watch::channel(AppState {
            form,
            ..AppState::default()
        });
        Self { backend, state }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> AppState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.state.subscribe()
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        self.state.send_modify(|state| state.form.prompt = prompt);
    }

    pub fn set_negative_prompt(&self, negative_prompt: impl Into<String>) {
        let negative_prompt = negative_prompt.into();
        self.state
            .send_modify(|state| state.form.negative_prompt = negative_prompt);
    }

    pub fn select_checkpoint(&self, checkpoint: impl Into<String>) {
        let checkpoint = checkpoint.into();
        self.state
            .send_modify(|state| state.form.checkpoint_model = checkpoint);
    }

    /// An empty name selects no LoRA.
    pub fn select_lora(&self, lora: impl Into<String>) {
        let lora = lora.into();
        self.state.send_modify(|state| state.form.lora_model = lora);
    }

    /// Fetches both model lists and stores them in the state.
    ///
    /// `models_loading` stays set until both fetches have settled. Failures
    /// end up in `models_error`; this never fails.
    pub async fn load_models(&self) {
        self.state.send_modify(|state| {
            state.models_loading = true;
            state.models_error = None;
        });
        let _settle = Settle {
            state: &self.state,
            clear: |state| state.models_loading = false,
        };

        let load = load_catalog(&self.backend).await;
        info!(
            checkpoints = load.catalog.checkpoints.len(),
            loras = load.catalog.loras.len(),
            "model catalog loaded"
        );
        self.state.send_modify(|state| {
            state.catalog = load.catalog;
            state.models_error = load.error;
        });
    }

    /// Submits the current form.
    ///
    /// Returns `false` without touching the state or the backend when the
    /// prompt is empty or no checkpoint is selected. Otherwise the previous
    /// results and error are cleared, one request is issued, and the outcome
    /// replaces them.
    pub async fn generate(&self) -> bool {
        let request = {
            let state = self.state.borrow();
            if !state.form.is_submittable() {
                debug!("generate ignored: prompt or checkpoint missing");
                return false;
            }
            state.form.to_request()
        };

        self.state.send_modify(|state| {
            state.generating = true;
            state.images.clear();
            state.error = None;
        });
        let _settle = Settle {
            state: &self.state,
            clear: |state| state.generating = false,
        };

        info!(
            checkpoint = %request.checkpoint_model,
            lora = %request.lora_model,
            "submitting generation request"
        );
        match self.backend.generate(request).await {
            Ok(urls) => {
                info!(count = urls.len(), "generation finished");
                let images = urls
                    .into_iter()
                    .enumerate()
                    .map(|(id, url)| GeneratedImage { id, url })
                    .collect();
                self.state.send_modify(|state| state.images = images);
            }
            Err(err) => {
                error!(error = %err, "failed to generate image");
                self.state.send_modify(|state| {
                    state.images.clear();
                    state.error = Some(err.to_string());
                });
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;
    use crate::{BackendError, GenerationRequest, ModelKind, RequestStatus};
    use rstest::rstest;

    async fn loaded(backend: FakeBackend) -> GeneratorController<FakeBackend> {
        let controller = GeneratorController::new(backend);
        controller.load_models().await;
        controller
    }

    #[tokio::test]
    async fn issues_one_request_with_form_values() {
        let backend = FakeBackend::new(&["ckptA"], &["loraX"]);
        backend.respond_with(Ok(vec!["u1"]));
        let controller = loaded(backend).await;
        controller.set_prompt("a castle");
        controller.set_negative_prompt("blurry");
        controller.select_checkpoint("ckptA");
        controller.select_lora("loraX");

        assert!(controller.generate().await);

        assert_eq!(
            controller.backend().requests(),
            vec![GenerationRequest {
                prompt: "a castle".to_string(),
                negative_prompt: "blurry".to_string(),
                checkpoint_model: "ckptA".to_string(),
                lora_model: "loraX".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn sends_empty_lora_when_none_selected() {
        let controller = loaded(FakeBackend::new(&["ckptA"], &[])).await;
        controller.select_checkpoint("ckptA");
        controller.generate().await;
        let requests = controller.backend().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].lora_model, "");
    }

    #[tokio::test]
    async fn missing_prompt_or_checkpoint_is_a_no_op() {
        let controller = loaded(FakeBackend::new(&["ckptA"], &[])).await;
        let before = controller.state();
        assert!(!controller.generate().await);
        assert_eq!(controller.state(), before);

        controller.select_checkpoint("ckptA");
        controller.set_prompt("");
        let before_empty_prompt = controller.state();
        assert!(!controller.generate().await);

        assert!(controller.backend().requests().is_empty());
        assert_eq!(before.status(), RequestStatus::Idle);
        assert_eq!(controller.state(), before_empty_prompt);
    }

    #[tokio::test]
    async fn success_replaces_previous_results() {
        let backend = FakeBackend::new(&["ckptA"], &[]);
        backend.respond_with(Ok(vec!["old.png", "older.png", "oldest.png"]));
        let controller = loaded(backend).await;
        controller.select_checkpoint("ckptA");
        controller.generate().await;
        assert_eq!(controller.state().images.len(), 3);

        controller
            .backend()
            .respond_with(Ok(vec!["a.png", "b.png"]));
        controller.generate().await;

        let state = controller.state();
        assert_eq!(
            state.images,
            vec![
                GeneratedImage {
                    id: 0,
                    url: "a.png".to_string()
                },
                GeneratedImage {
                    id: 1,
                    url: "b.png".to_string()
                },
            ]
        );
        assert_eq!(state.error, None);
        assert_eq!(state.status(), RequestStatus::Succeeded);
    }

    #[tokio::test]
    async fn server_error_clears_results() {
        let backend = FakeBackend::new(&["ckptA"], &[]);
        backend.respond_with(Ok(vec!["a.png"]));
        let controller = loaded(backend).await;
        controller.select_checkpoint("ckptA");
        controller.generate().await;

        controller
            .backend()
            .respond_with(Err(BackendError::from_status(400, br#"{"error":"bad model"}"#)));
        controller.generate().await;

        let state = controller.state();
        assert_eq!(state.error.as_deref(), Some("bad model"));
        assert!(state.images.is_empty());
        assert!(!state.generating);
        assert_eq!(state.status(), RequestStatus::Failed);
    }

    #[tokio::test]
    async fn transport_error_surfaces_message() {
        let backend = FakeBackend::new(&["ckptA"], &[]);
        backend.respond_with(Err(BackendError::Transport(
            "error sending request".to_string(),
        )));
        let controller = loaded(backend).await;
        controller.select_checkpoint("ckptA");
        controller.generate().await;

        let state = controller.state();
        assert_eq!(state.error.as_deref(), Some("error sending request"));
        assert!(!state.generating);
    }

    #[tokio::test]
    async fn submission_clears_previous_outcome_while_in_flight() {
        let (backend, gate) = FakeBackend::new(&["ckptA"], &[]).gated();
        backend.respond_with(Err(BackendError::Transport("x".into())));
        let controller = loaded(backend).await;
        controller.select_checkpoint("ckptA");
        gate.notify_one();
        controller.generate().await;
        assert!(controller.state().error.is_some());

        controller.backend().respond_with(Ok(vec!["u1"]));
        let observe = async {
            tokio::task::yield_now().await;
            let state = controller.state();
            assert!(state.generating);
            assert!(state.error.is_none());
            assert!(state.images.is_empty());
            assert!(!state.generate_enabled());
            gate.notify_one();
        };
        let (issued, ()) = tokio::join!(controller.generate(), observe);

        assert!(issued);
        let state = controller.state();
        assert!(!state.generating);
        assert_eq!(state.images.len(), 1);
    }

    #[tokio::test]
    async fn dropped_request_still_clears_in_flight_flag() {
        let (backend, _gate) = FakeBackend::new(&["ckptA"], &[]).gated();
        let controller = loaded(backend).await;
        controller.select_checkpoint("ckptA");

        let pending = controller.generate();
        tokio::select! {
            _ = pending => panic!("gated request should not finish"),
            _ = tokio::task::yield_now() => {}
        }
        assert!(!controller.state().generating);
    }

    #[tokio::test]
    async fn catalog_failures_end_loading() {
        let backend = FakeBackend::new(&["ckptA"], &["loraX"])
            .fail_listing(ModelKind::Checkpoints)
            .fail_listing(ModelKind::Loras);
        let controller = GeneratorController::new(backend);
        assert!(controller.state().models_loading);

        controller.load_models().await;

        let state = controller.state();
        assert!(!state.models_loading);
        assert!(state.models_error.is_some());
        assert!(state.catalog.checkpoints.is_empty());
        assert!(state.catalog.loras.is_empty());
    }

    #[rstest]
    #[case(ModelKind::Loras, ModelKind::Checkpoints)]
    #[case(ModelKind::Checkpoints, ModelKind::Loras)]
    #[tokio::test]
    async fn loading_lasts_until_both_listings_settle(
        #[case] slow: ModelKind,
        #[case] fast: ModelKind,
    ) {
        let (backend, gate) = FakeBackend::new(&["ckptA"], &["loraX"]).gate_listing(slow);
        let controller = GeneratorController::new(backend);

        let observe = async {
            tokio::task::yield_now().await;
            assert_eq!(controller.backend().listed(), vec![fast]);
            let state = controller.state();
            assert!(state.models_loading);
            assert_eq!(state.status(), RequestStatus::LoadingModels);
            gate.notify_one();
        };
        tokio::join!(controller.load_models(), observe);

        assert_eq!(controller.backend().listed(), vec![fast, slow]);
        let state = controller.state();
        assert!(!state.models_loading);
        assert_eq!(state.catalog.checkpoints, ["ckptA"]);
        assert_eq!(state.catalog.loras, ["loraX"]);
    }

    #[tokio::test]
    async fn subscribers_see_generation_settle() {
        let backend = FakeBackend::new(&["ckptA"], &[]);
        backend.respond_with(Ok(vec!["u1"]));
        let controller = loaded(backend).await;
        controller.select_checkpoint("ckptA");
        let mut updates = controller.subscribe();

        controller.generate().await;

        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().status(), RequestStatus::Succeeded);
    }

    #[tokio::test]
    async fn mount_load_select_generate_scenario() {
        let backend = FakeBackend::new(&["ckptA"], &["loraX"]);
        backend.respond_with(Ok(vec!["u1"]));
        let controller = GeneratorController::new(backend);

        controller.load_models().await;
        let state = controller.state();
        assert_eq!(state.catalog.checkpoints, ["ckptA"]);
        assert_eq!(state.catalog.loras, ["loraX"]);
        assert!(!state.generate_enabled());

        controller.select_checkpoint("ckptA");
        controller.set_prompt("p");
        assert!(controller.state().generate_enabled());
        controller.generate().await;

        let state = controller.state();
        assert_eq!(
            state.images,
            vec![GeneratedImage {
                id: 0,
                url: "u1".to_string()
            }]
        );
        assert_eq!(state.error, None);
        assert!(!state.generating);
    }
}
