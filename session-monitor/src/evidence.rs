use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::warn;

use models::{Evidence, ViolationType};

use crate::capability::FrameGrabber;

/// Inline embedding for a captured frame, used when upload fails so the
/// violation record is never dropped for lack of a hosted URL.
pub fn jpeg_data_url(jpeg: &[u8]) -> String {
    format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(jpeg)
    )
}

/// Pushes a captured frame to hosted storage and returns its URL.
#[async_trait]
pub trait EvidenceUploader: Send + Sync {
    async fn upload(&self, jpeg: &[u8], kind: ViolationType) -> anyhow::Result<String>;
}

/// Uploads frames to the screenshot endpoint as base64 JSON payloads.
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl EvidenceUploader for HttpUploader {
    async fn upload(&self, jpeg: &[u8], kind: ViolationType) -> anyhow::Result<String> {
        #[derive(Deserialize)]
        struct UploadResponse {
            url: String,
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "image": jpeg_data_url(jpeg),
                "type": kind,
            }))
            .send()
            .await?
            .error_for_status()?;

        let parsed: UploadResponse = response.json().await?;
        Ok(parsed.url)
    }
}

/// Screenshot pipeline for qualifying violations: grab a frame, try the
/// hosted upload, embed inline on failure. Fire-and-forget relative to the
/// detection loops; a dead camera just means the event reports without
/// evidence.
pub struct EvidenceCapture {
    grabber: Box<dyn FrameGrabber>,
    uploader: Box<dyn EvidenceUploader>,
}

impl EvidenceCapture {
    pub fn new(grabber: Box<dyn FrameGrabber>, uploader: Box<dyn EvidenceUploader>) -> Self {
        Self { grabber, uploader }
    }

    pub async fn capture(
        &mut self,
        kind: ViolationType,
        confidence: Option<f64>,
    ) -> Option<Evidence> {
        let jpeg = match self.grabber.grab_jpeg().await {
            Ok(jpeg) => jpeg,
            Err(e) => {
                warn!(error = ?e, "unable to capture evidence frame");
                return None;
            }
        };

        let url = match self.uploader.upload(&jpeg, kind).await {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "evidence upload failed; embedding inline");
                jpeg_data_url(&jpeg)
            }
        };

        Some(Evidence {
            url,
            kind,
            detected_at: bson::DateTime::now(),
            confidence,
        })
    }
}
