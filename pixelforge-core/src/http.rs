use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

use crate::catalog::ModelListResponse;
use crate::{Backend, BackendError, ClientConfig, GenerationRequest, ImageWriter, ModelKind};

const GENERATE_ENDPOINT: &str = "api/generate";

#[derive(Deserialize)]
struct GenerationResponse {
    images: Vec<String>,
}

/// Talks to the generation backend over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    config: ClientConfig,
}

impl HttpBackend {
    pub fn new(config: ClientConfig) -> Result<Self, BackendError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// An image writer sharing this backend's connection pool.
    pub fn image_writer(&self) -> ImageWriter {
        ImageWriter::new(self.client.clone())
    }
}

/// Turns non-2xx responses into [`BackendError::Status`].
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    Err(BackendError::from_status(status.as_u16(), &body))
}

impl Backend for HttpBackend {
    async fn list_models(&self, kind: ModelKind) -> Result<Vec<String>, BackendError> {
        let url = self.config.endpoint(&kind.endpoint())?;
        debug!(%url, "fetching model list");
        let response = check_status(self.client.get(url).send().await?).await?;
        let body: ModelListResponse = response.json().await?;
        Ok(body.into_models())
    }

    async fn generate(&self, request: GenerationRequest) -> Result<Vec<String>, BackendError> {
        let url = self.config.endpoint(GENERATE_ENDPOINT)?;
        debug!(%url, "posting generation request");
        let response = self.client.post(url).json(&request).send().await?;
        let body: GenerationResponse = check_status(response).await?.json().await?;
        Ok(body.images)
    }
}
