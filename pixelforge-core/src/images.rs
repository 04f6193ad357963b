use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use base64::{prelude::BASE64_STANDARD, Engine};
use image::{DynamicImage, ImageFormat};
use tracing::{debug, info};

use crate::{BackendError, GeneratedImage};

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("unsupported image url: {0}")]
    UnsupportedUrl(String),
    #[error("malformed data url")]
    MalformedDataUrl,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unreadable image: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to download image: {0}")]
    Download(#[from] BackendError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A `data:<mime>;base64,<payload>` URL, as the backend returns images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime: String,
    pub data: Vec<u8>,
}

impl FromStr for DataUrl {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix("data:").ok_or(ImageError::MalformedDataUrl)?;
        let (header, payload) = rest.split_once(',').ok_or(ImageError::MalformedDataUrl)?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or(ImageError::MalformedDataUrl)?;
        let data = BASE64_STANDARD.decode(payload.trim())?;
        Ok(DataUrl {
            mime: mime.to_string(),
            data,
        })
    }
}

/// Encodes an image as a PNG `data:` URL.
pub fn png_data_url(img: &DynamicImage) -> Result<String, ImageError> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(format!("data:image/png;base64,{}", BASE64_STANDARD.encode(&bytes)))
}

/// Resolves generated image URLs to bytes and writes them to disk.
#[derive(Debug, Clone, Default)]
pub struct ImageWriter {
    client: reqwest::Client,
}

impl ImageWriter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Raw bytes behind an image URL. `data:` URLs are decoded in place,
    /// `http(s)` URLs are downloaded.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        if url.starts_with("data:") {
            return Ok(url.parse::<DataUrl>()?.data);
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ImageError::UnsupportedUrl(url.to_string()));
        }

        debug!(%url, "downloading image");
        let response = self.client.get(url).send().await.map_err(BackendError::from)?;
        let status = response.status();
        let body = response.bytes().await.map_err(BackendError::from)?;
        if !status.is_success() {
            return Err(BackendError::from_status(status.as_u16(), &body).into());
        }
        Ok(body.to_vec())
    }

    /// Writes every image to `<dir>/image-<id>.png`, creating `dir` if needed.
    pub async fn save_all(
        &self,
        images: &[GeneratedImage],
        dir: &Path,
    ) -> Result<Vec<PathBuf>, ImageError> {
        tokio::fs::create_dir_all(dir).await?;
        let mut paths = Vec::with_capacity(images.len());
        for image in images {
            let bytes = self.fetch(&image.url).await?;
            // Re-encode so whatever the backend sent ends up as a valid PNG.
            let decoded = image::load_from_memory(&bytes)?;
            let mut png = Vec::new();
            decoded.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

            let path = dir.join(format!("image-{}.png", image.id));
            tokio::fs::write(&path, png).await?;
            info!(path = %path.display(), "saved image");
            paths.push(path);
        }
        Ok(paths)
    }
}

/// Shortens `data:` URLs for terminal output.
pub fn display_url(url: &str) -> String {
    match url.parse::<DataUrl>() {
        Ok(data_url) => format!("data:{} ({} bytes)", data_url.mime, data_url.data.len()),
        Err(_) => url.to_string(),
    }
}
