use std::time::Duration;

use url::Url;

/// Loopback address the generation server listens on by default.
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    base_url: Url,
    /// Unset means requests may hang forever.
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(mut base_url: Url) -> Self {
        // `Url::join` replaces the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            base_url,
            timeout: None,
        }
    }

    pub fn parse(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(base_url)?))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves an API path such as `api/loras` against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path.trim_start_matches('/'))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::parse(DEFAULT_BACKEND_URL).expect("default backend url is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_points_at_local_backend_without_timeout() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url().as_str(), "http://127.0.0.1:5000/");
        assert_eq!(config.timeout, None);
    }

    #[rstest]
    #[case("http://127.0.0.1:5000", "api/checkpoints", "http://127.0.0.1:5000/api/checkpoints")]
    #[case("http://localhost:8080/sd", "api/loras", "http://localhost:8080/sd/api/loras")]
    #[case("http://localhost:8080/sd/", "/api/generate", "http://localhost:8080/sd/api/generate")]
    fn endpoint_joins_under_base_path(
        #[case] base: &str,
        #[case] path: &str,
        #[case] expected: &str,
    ) {
        let config = ClientConfig::parse(base).unwrap();
        assert_eq!(config.endpoint(path).unwrap().as_str(), expected);
    }

    #[test]
    fn rejects_relative_base_url() {
        assert!(ClientConfig::parse("/api").is_err());
        assert!(ClientConfig::parse("not a url").is_err());
    }
}
