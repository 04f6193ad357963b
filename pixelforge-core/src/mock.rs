use std::time::Duration;

use image::{DynamicImage, Rgb, RgbImage};
use tracing::debug;

use crate::images::png_data_url;
use crate::{Backend, BackendError, GenerationRequest, ModelKind};

/// Side length of the placeholder sprites, matching the backend's downscale.
const SPRITE_SIZE: u32 = 16;

/// In-process stand-in for the generation backend.
///
/// Serves fixed catalogs and answers generation requests with pixel-art
/// placeholder sprites after a simulated delay. Sprites are derived from the
/// request, so the same request always yields the same images.
#[derive(Debug, Clone)]
pub struct MockBackend {
    checkpoints: Vec<String>,
    loras: Vec<String>,
    latency: Duration,
    images_per_request: usize,
    failing_catalog: Option<ModelKind>,
    failing_generation: Option<String>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            checkpoints: vec![
                "pixel-art-xl.safetensors".to_string(),
                "sd-v1-5-pruned-emaonly.safetensors".to_string(),
            ],
            loras: vec![
                "16bit-sprites.safetensors".to_string(),
                "retro-rpg-tiles.safetensors".to_string(),
            ],
            latency: Duration::from_millis(1500),
            images_per_request: 4,
            failing_catalog: None,
            failing_generation: None,
        }
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(mut self, checkpoints: Vec<String>, loras: Vec<String>) -> Self {
        self.checkpoints = checkpoints;
        self.loras = loras;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_images_per_request(mut self, count: usize) -> Self {
        self.images_per_request = count;
        self
    }

    /// Makes the listing of `kind` fail with a 500.
    pub fn fail_catalog(mut self, kind: ModelKind) -> Self {
        self.failing_catalog = Some(kind);
        self
    }

    /// Makes every generation fail with a 500 carrying `message`.
    pub fn fail_generation(mut self, message: impl Into<String>) -> Self {
        self.failing_generation = Some(message.into());
        self
    }
}

impl Backend for MockBackend {
    async fn list_models(&self, kind: ModelKind) -> Result<Vec<String>, BackendError> {
        if self.failing_catalog == Some(kind) {
            return Err(BackendError::Status {
                status: 500,
                message: format!("mock backend refused to list {kind}"),
            });
        }
        Ok(match kind {
            ModelKind::Checkpoints => self.checkpoints.clone(),
            ModelKind::Loras => self.loras.clone(),
        })
    }

    async fn generate(&self, request: GenerationRequest) -> Result<Vec<String>, BackendError> {
        debug!(latency = ?self.latency, "mock generation started");
        tokio::time::sleep(self.latency).await;

        if request.prompt.is_empty() || request.checkpoint_model.is_empty() {
            return Err(BackendError::Status {
                status: 400,
                message: "Prompt and Checkpoint Model are required.".to_string(),
            });
        }
        if let Some(message) = &self.failing_generation {
            return Err(BackendError::Status {
                status: 500,
                message: message.clone(),
            });
        }

        let seed = fingerprint(&request);
        (0..self.images_per_request)
            .map(|index| {
                let sprite = render_sprite(seed.wrapping_add(index as u64));
                png_data_url(&sprite).map_err(|err| BackendError::Decode(err.to_string()))
            })
            .collect()
    }
}

/// FNV-1a over the request fields.
fn fingerprint(request: &GenerationRequest) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for field in [
        &request.prompt,
        &request.negative_prompt,
        &request.checkpoint_model,
        &request.lora_model,
    ] {
        for byte in field.bytes().chain(std::iter::once(0)) {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
    }
    hash
}

/// Horizontally symmetric sprite on a dark background.
fn render_sprite(seed: u64) -> DynamicImage {
    let mut rng = XorShift(seed | 1);
    let palette = [
        Rgb([rng.next_u64() as u8, rng.next_u64() as u8, rng.next_u64() as u8]),
        Rgb([rng.next_u64() as u8, rng.next_u64() as u8, rng.next_u64() as u8]),
        Rgb([rng.next_u64() as u8, rng.next_u64() as u8, rng.next_u64() as u8]),
    ];
    let background = Rgb([24, 20, 37]);

    let mut img = RgbImage::from_pixel(SPRITE_SIZE, SPRITE_SIZE, background);
    let half = SPRITE_SIZE / 2;
    for y in 2..SPRITE_SIZE - 2 {
        for x in 2..half {
            let roll = rng.next_u64() % 5;
            if roll < 3 {
                let color = palette[roll as usize];
                img.put_pixel(x, y, color);
                img.put_pixel(SPRITE_SIZE - 1 - x, y, color);
            }
        }
    }
    DynamicImage::ImageRgb8(img)
}

struct XorShift(u64);

impl XorShift {
    fn next_u64(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }
}
