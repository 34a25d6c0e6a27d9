//! Guarded URL fetching with manual redirect handling and streamed size
//! enforcement.

use std::time::Duration;

use reqwest::{header, redirect::Policy, Client, Response};
use url::Url;

use esg_core::{EsgError, EsgResult, FetchFailure, MimeKind};

use crate::extract;
use crate::guard;

pub const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone)]
pub struct AcquirerConfig {
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub max_bytes: u64,
    /// Test hook: skips the address screening so a local mock server can
    /// be fetched. Never enabled in production configuration.
    pub allow_private_hosts: bool,
}

impl Default for AcquirerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            connect_timeout_ms: 5_000,
            max_bytes: 10 * 1024 * 1024,
            allow_private_hosts: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub text: String,
    pub mime: MimeKind,
    pub final_url: String,
    pub bytes: usize,
}

pub struct ContentAcquirer {
    client: Client,
    config: AcquirerConfig,
}

impl ContentAcquirer {
    pub fn new(config: AcquirerConfig) -> EsgResult<Self> {
        // Redirects are followed manually so every hop passes the guard.
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent("esg-platform/1.0")
            .build()
            .map_err(|e| EsgError::Internal {
                message: format!("http client construction failed: {}", e),
            })?;
        Ok(Self { client, config })
    }

    fn validate(&self, raw_url: &str) -> EsgResult<Url> {
        if self.config.allow_private_hosts {
            guard::parse_allowed_scheme(raw_url)
        } else {
            guard::validate_url(raw_url)
        }
    }

    /// Fetches a single document, classifies it and extracts clean text.
    pub async fn fetch(&self, raw_url: &str) -> EsgResult<FetchedContent> {
        let mut current = self.validate(raw_url)?;

        for _hop in 0..=MAX_REDIRECTS {
            if !self.config.allow_private_hosts {
                guard::resolve_and_check(&current).await?;
            }

            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(map_transport_error)?;

            let status = response.status();
            if status.is_redirection() {
                let next = redirect_target(&current, &response)?;
                // Every hop passes the same pre-resolution checks.
                current = self.validate(next.as_str())?;
                continue;
            }
            if status.is_client_error() {
                return Err(EsgError::Fetch {
                    reason: FetchFailure::Upstream4xx,
                    message: format!("upstream returned {}", status),
                });
            }
            if status.is_server_error() {
                return Err(EsgError::Fetch {
                    reason: FetchFailure::Upstream5xx,
                    message: format!("upstream returned {}", status),
                });
            }

            let mime = classify(&response);
            let final_url = response.url().to_string();
            let body = self.read_capped(response).await?;
            let text = match mime_or_sniffed(mime, &body) {
                MimeKind::Html => extract::extract_html(&String::from_utf8_lossy(&body))?,
                MimeKind::Pdf => extract::extract_pdf(&body)?,
                MimeKind::Text => extract::postprocess(&String::from_utf8_lossy(&body)),
            };
            if text.is_empty() {
                return Err(EsgError::Parse {
                    message: "document empty after cleaning".to_string(),
                });
            }

            return Ok(FetchedContent {
                text,
                mime: mime_or_sniffed(mime, &body),
                final_url,
                bytes: body.len(),
            });
        }

        Err(EsgError::Fetch {
            reason: FetchFailure::Disallowed,
            message: format!("redirect chain exceeded {} hops", MAX_REDIRECTS),
        })
    }

    /// Streams the body, aborting as soon as the cap is exceeded. A body of
    /// exactly `max_bytes` is accepted.
    async fn read_capped(&self, mut response: Response) -> EsgResult<Vec<u8>> {
        if let Some(length) = response.content_length() {
            if length > self.config.max_bytes {
                return Err(too_large(length, self.config.max_bytes));
            }
        }

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(map_transport_error)? {
            if body.len() as u64 + chunk.len() as u64 > self.config.max_bytes {
                return Err(too_large(
                    body.len() as u64 + chunk.len() as u64,
                    self.config.max_bytes,
                ));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

fn too_large(got: u64, cap: u64) -> EsgError {
    EsgError::Fetch {
        reason: FetchFailure::TooLarge,
        message: format!("body of {} bytes exceeds the {} byte cap", got, cap),
    }
}

fn map_transport_error(err: reqwest::Error) -> EsgError {
    if err.is_timeout() {
        EsgError::Fetch {
            reason: FetchFailure::Timeout,
            message: "fetch timed out".to_string(),
        }
    } else {
        EsgError::Fetch {
            reason: FetchFailure::Upstream5xx,
            message: format!("transport failure: {}", err),
        }
    }
}

fn redirect_target(current: &Url, response: &Response) -> EsgResult<Url> {
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| EsgError::Fetch {
            reason: FetchFailure::Upstream5xx,
            message: format!("redirect {} without location", response.status()),
        })?;
    current.join(location).map_err(|e| EsgError::Fetch {
        reason: FetchFailure::Disallowed,
        message: format!("invalid redirect target: {}", e),
    })
}

fn classify(response: &Response) -> MimeKind {
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();
    if content_type.starts_with("text/html") || content_type.starts_with("application/xhtml") {
        MimeKind::Html
    } else if content_type.starts_with("application/pdf") {
        MimeKind::Pdf
    } else {
        MimeKind::Text
    }
}

/// Content sniffing for servers that lie about or omit the content type.
fn mime_or_sniffed(declared: MimeKind, body: &[u8]) -> MimeKind {
    if body.starts_with(b"%PDF-") {
        return MimeKind::Pdf;
    }
    if declared == MimeKind::Text {
        let head = String::from_utf8_lossy(&body[..body.len().min(512)]).to_lowercase();
        if head.contains("<html") || head.contains("<!doctype html") {
            return MimeKind::Html;
        }
    }
    declared
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn private_urls_are_rejected_without_io() {
        let acquirer = ContentAcquirer::new(AcquirerConfig::default()).unwrap();
        let err = acquirer.fetch("http://127.0.0.1/x").await.unwrap_err();
        match err {
            EsgError::Fetch { reason, .. } => assert_eq!(reason, FetchFailure::Disallowed),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn bad_schemes_are_rejected() {
        let acquirer = ContentAcquirer::new(AcquirerConfig::default()).unwrap();
        assert!(acquirer.fetch("ftp://example.com/doc").await.is_err());
    }
}
