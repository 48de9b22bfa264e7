use async_trait::async_trait;
use fable_traits::{ImageFetcher, ProviderError};
use fable_types::PLACEHOLDER_IMAGE_REF;
use std::path::PathBuf;
use std::time::Duration;

/// Resolves image references that are either HTTP(S) URLs or local paths.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    http: reqwest::Client,
    head_timeout: Duration,
    get_timeout: Duration,
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(10))
    }
}

enum Location {
    Remote,
    Local(PathBuf),
    Placeholder,
}

fn locate(reference: &str) -> Location {
    let reference = reference.trim();
    if reference == PLACEHOLDER_IMAGE_REF {
        Location::Placeholder
    } else if reference.starts_with("http://") || reference.starts_with("https://") {
        Location::Remote
    } else {
        Location::Local(PathBuf::from(
            reference.strip_prefix("file://").unwrap_or(reference),
        ))
    }
}

impl HttpImageFetcher {
    pub fn new(head_timeout: Duration, get_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            head_timeout,
            get_timeout,
        }
    }

    async fn head_ok(&self, url: &str) -> bool {
        let response = match self.http.head(url).timeout(self.head_timeout).send().await {
            Ok(r) => r,
            Err(e) => {
                log::debug!("HEAD {} failed: {}", url, e);
                return false;
            }
        };
        let is_image = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("image/"));
        response.status() == reqwest::StatusCode::OK && is_image
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .http
            .get(url)
            .timeout(self.get_timeout)
            .send()
            .await
            .map_err(|e| ProviderError::Unreachable(format!("{}: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(ProviderError::Unreachable(format!(
                "{} returned HTTP {}",
                url,
                response.status().as_u16()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Unreachable(format!("{}: {}", url, e)))?;
        if bytes.is_empty() {
            return Err(ProviderError::Unreachable(format!("{} returned an empty body", url)));
        }
        Ok(bytes.to_vec())
    }

    async fn read_local(path: &PathBuf) -> Result<Vec<u8>, ProviderError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ProviderError::Unreachable(format!("{}: {}", path.display(), e)))?;
        if bytes.is_empty() {
            return Err(ProviderError::Unreachable(format!("{} is empty", path.display())));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn verify(&self, reference: &str) -> Result<(), ProviderError> {
        match locate(reference) {
            Location::Placeholder => Ok(()),
            Location::Remote => {
                if self.head_ok(reference).await {
                    return Ok(());
                }
                // Some hosts reject HEAD; a successful download is proof enough.
                self.get(reference).await.map(|_| ())
            }
            Location::Local(path) => {
                let meta = tokio::fs::metadata(&path)
                    .await
                    .map_err(|e| ProviderError::Unreachable(format!("{}: {}", path.display(), e)))?;
                if meta.is_file() && meta.len() > 0 {
                    Ok(())
                } else {
                    Err(ProviderError::Unreachable(format!("{} is empty", path.display())))
                }
            }
        }
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, ProviderError> {
        match locate(reference) {
            Location::Placeholder => Err(ProviderError::Unreachable(
                "placeholder reference has no payload".to_string(),
            )),
            Location::Remote => self.get(reference).await,
            Location::Local(path) => Self::read_local(&path).await,
        }
    }
}
