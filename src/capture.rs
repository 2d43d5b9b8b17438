//! Screenshot capture and publishing
//!
//! The vision model needs a public URL, so every capture is written to disk
//! and then uploaded to Imgur.

use crate::config::ImgurConfig;
use crate::window::{GameWindow, WindowError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("failed to save screenshot to {path}: {reason}")]
    Save { path: PathBuf, reason: String },
    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("upload rejected with {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Captures the game window and returns a URL the planner can fetch
pub trait ScreenPublisher: Send + Sync {
    fn capture_and_publish(&self, window: &dyn GameWindow) -> Result<String, CaptureError>;
}

/// Activate, capture and save `window` as a timestamped PNG under `dir`.
pub fn save_screenshot(
    window: &dyn GameWindow,
    dir: &Path,
    settle: Duration,
) -> Result<PathBuf, CaptureError> {
    window.activate()?;
    thread::sleep(settle);

    let geometry = window.geometry()?;
    tracing::debug!(
        x = geometry.x,
        y = geometry.y,
        width = geometry.width,
        height = geometry.height,
        "window geometry"
    );

    let image = window.capture()?;

    fs::create_dir_all(dir).map_err(|e| CaptureError::Save {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;
    let path = dir.join(format!(
        "game_{}.png",
        chrono::Local::now().format("%Y%m%d_%H%M%S_%3f")
    ));
    image.save(&path).map_err(|e| CaptureError::Save {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    tracing::info!(path = %path.display(), "screenshot saved");
    Ok(path)
}

#[derive(Debug, Deserialize)]
struct ImgurResponse {
    data: ImgurImage,
}

#[derive(Debug, Deserialize)]
struct ImgurImage {
    link: String,
}

/// Uploads screenshots anonymously to Imgur
pub struct ImgurPublisher {
    client: reqwest::blocking::Client,
    endpoint: String,
    client_id: String,
    screenshot_dir: PathBuf,
    settle: Duration,
}

impl ImgurPublisher {
    pub fn new(
        config: &ImgurConfig,
        screenshot_dir: impl Into<PathBuf>,
        settle: Duration,
    ) -> Result<Self, CaptureError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            client_id: config.client_id.clone(),
            screenshot_dir: screenshot_dir.into(),
            settle,
        })
    }

    pub fn upload(&self, path: &Path) -> Result<String, CaptureError> {
        let bytes = fs::read(path).map_err(|e| CaptureError::Save {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let body = serde_json::json!({
            "image": B64.encode(&bytes),
            "type": "base64",
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Client-ID {}", self.client_id))
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CaptureError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let uploaded: ImgurResponse = response.json()?;
        tracing::info!(url = %uploaded.data.link, bytes = bytes.len(), "screenshot uploaded");
        Ok(uploaded.data.link)
    }
}

impl ScreenPublisher for ImgurPublisher {
    fn capture_and_publish(&self, window: &dyn GameWindow) -> Result<String, CaptureError> {
        let path = save_screenshot(window, &self.screenshot_dir, self.settle)?;
        self.upload(&path)
    }
}
