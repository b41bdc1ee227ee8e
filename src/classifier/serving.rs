// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Model server client for leaf classification
//!
//! Talks to a TensorFlow Serving style REST API: the saved model directory
//! is served under a name, status lives at `/v1/models/<name>` and
//! inference at `/v1/models/<name>:predict`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use super::Classifier;
use crate::config::ClassifierConfig;
use crate::{CropError, Result};

/// Longest wait between predict retries
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// One image as height x width x RGB, values in [0, 1]
pub type Tensor = Vec<Vec<[f32; 3]>>;

/// Model server client
pub struct ServingClassifier {
    client: Client,
    base_url: String,
    model: String,
    input_size: u32,
    retries: u32,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: &'a [Tensor],
}

#[derive(Deserialize)]
struct PredictResponse {
    predictions: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct ModelStatusResponse {
    model_version_status: Vec<VersionStatus>,
}

#[derive(Deserialize)]
struct VersionStatus {
    version: String,
    state: String,
}

impl ServingClassifier {
    /// Create a new model server client
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: normalize_base_url(&config.url),
            model: config.model.clone(),
            input_size: config.input_size,
            retries: config.retries,
        })
    }

    fn model_url(&self) -> String {
        format!("{}/v1/models/{}", self.base_url, self.model)
    }

    /// Check that the server has an available version of the model
    pub async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.model_url())
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                CropError::ClassifierUnavailable(format!(
                    "Cannot connect to model server at {}: {}",
                    self.base_url, e
                ))
            })?;

        if !response.status().is_success() {
            return Err(CropError::ClassifierUnavailable(format!(
                "Model '{}' not found (status {})",
                self.model,
                response.status()
            )));
        }

        let status: ModelStatusResponse = response.json().await?;
        match status.model_version_status.iter().find(|v| v.state == "AVAILABLE") {
            Some(v) => {
                debug!("Model '{}' version {} available", self.model, v.version);
                Ok(())
            }
            None => Err(CropError::ClassifierUnavailable(format!(
                "Model '{}' has no available version",
                self.model
            ))),
        }
    }

    /// Send one tensor for inference
    pub async fn predict_tensor(&self, tensor: Tensor) -> Result<Vec<f32>> {
        let url = format!("{}:predict", self.model_url());
        let instances = [tensor];
        let request = PredictRequest { instances: &instances };

        debug!("Sending predict request: model={}", self.model);

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(CropError::Inference(format!(
                "Model server returned status {}",
                response.status()
            )));
        }

        let result: PredictResponse = response.json().await?;
        first_row(result)
    }

    /// Predict with retry logic
    pub async fn predict_with_retry(&self, tensor: Tensor) -> Result<Vec<f32>> {
        let mut last_error = None;

        for attempt in 0..=self.retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                warn!("Retrying predict request in {:?} (attempt {})", delay, attempt + 1);
                tokio::time::sleep(delay).await;
            }

            match self.predict_tensor(tensor.clone()).await {
                Ok(probs) => return Ok(probs),
                Err(e) => {
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            CropError::ClassifierUnavailable("Unknown error".to_string())
        }))
    }
}

/// Exponential backoff before retry `attempt` (1-based), capped
fn backoff_delay(attempt: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_secs(secs).min(MAX_BACKOFF)
}

#[async_trait]
impl Classifier for ServingClassifier {
    fn name(&self) -> &'static str {
        "serving"
    }

    async fn load(&self) -> Result<()> {
        self.health_check().await
    }

    async fn warm_up(&self) -> Result<()> {
        self.predict_tensor(zero_tensor(self.input_size)).await.map(|_| ())
    }

    async fn probabilities(&self, image: &Path) -> Result<Vec<f32>> {
        let path = image.to_path_buf();
        let size = self.input_size;
        let tensor = tokio::task::spawn_blocking(move || prepare_image(&path, size))
            .await
            .map_err(|e| CropError::Inference(format!("Image task failed: {}", e)))??;
        self.predict_with_retry(tensor).await
    }
}

/// Strip trailing slashes and any API path so only the server root remains
fn normalize_base_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    match url.find("/v1/") {
        Some(idx) => url[..idx].to_string(),
        None => url.to_string(),
    }
}

fn first_row(response: PredictResponse) -> Result<Vec<f32>> {
    response
        .predictions
        .into_iter()
        .next()
        .ok_or_else(|| CropError::Inference("empty predictions".to_string()))
}

/// Decode, resize to `size` x `size` RGB and scale to [0, 1]
pub fn prepare_image(path: &Path, size: u32) -> Result<Tensor> {
    let img = image::open(path)?
        .resize_exact(size, size, image::imageops::FilterType::Nearest)
        .to_rgb8();

    Ok(img
        .rows()
        .map(|row| {
            row.map(|px| {
                let [r, g, b] = px.0;
                [f32::from(r) / 255.0, f32::from(g) / 255.0, f32::from(b) / 255.0]
            })
            .collect()
        })
        .collect())
}

/// All-black input used to warm the model
pub fn zero_tensor(size: u32) -> Tensor {
    vec![vec![[0.0; 3]; size as usize]; size as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(65), MAX_BACKOFF);
        assert_eq!(backoff_delay(u32::MAX), MAX_BACKOFF);
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("http://localhost:8501/"), "http://localhost:8501");
        assert_eq!(
            normalize_base_url("http://localhost:8501/v1/models/my_model:predict"),
            "http://localhost:8501"
        );
    }

    #[test]
    fn test_model_urls() {
        let config = ClassifierConfig {
            url: "http://127.0.0.1:9000/".to_string(),
            model: "leaf_net".to_string(),
            ..ClassifierConfig::default()
        };
        let classifier = ServingClassifier::new(&config).unwrap();
        assert_eq!(classifier.model_url(), "http://127.0.0.1:9000/v1/models/leaf_net");
    }

    #[test]
    fn test_prepare_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf.png");
        image::RgbImage::from_pixel(10, 6, image::Rgb([255, 0, 51]))
            .save(&path)
            .unwrap();

        let tensor = prepare_image(&path, 4).unwrap();
        assert_eq!(tensor.len(), 4);
        assert!(tensor.iter().all(|row| row.len() == 4));
        assert_eq!(tensor[2][3], [1.0, 0.0, 0.2]);
    }

    #[test]
    fn test_prepare_image_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaf.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(matches!(prepare_image(&path, 4), Err(CropError::Image(_))));
    }

    #[test]
    fn test_request_and_response_shapes() {
        let instances = [zero_tensor(2)];
        let body = serde_json::to_value(PredictRequest { instances: &instances }).unwrap();
        assert_eq!(body["instances"][0][1][1], serde_json::json!([0.0, 0.0, 0.0]));

        let response: PredictResponse =
            serde_json::from_str(r#"{"predictions": [[0.1, 0.8, 0.1]]}"#).unwrap();
        assert_eq!(first_row(response).unwrap(), vec![0.1, 0.8, 0.1]);

        let empty: PredictResponse = serde_json::from_str(r#"{"predictions": []}"#).unwrap();
        assert!(first_row(empty).is_err());
    }

    #[test]
    fn test_model_status_parsing() {
        let status: ModelStatusResponse = serde_json::from_str(
            r#"{"model_version_status": [{"version": "1", "state": "AVAILABLE",
                "status": {"error_code": "OK", "error_message": ""}}]}"#,
        )
        .unwrap();
        assert_eq!(status.model_version_status[0].state, "AVAILABLE");
    }
}
