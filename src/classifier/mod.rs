// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Leaf image classification
//!
//! A [`Classifier`] turns an image into a probability vector over a fixed
//! label vocabulary. [`ClassifierService`] owns one classifier plus its
//! labels, tracks warm-up progress, and turns the top prediction into a
//! care report. It is built once at startup and shared by handle.

pub mod serving;

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClassifierConfig;
use crate::knowledge::{self, Report};
use crate::{CropError, Result};

pub use serving::ServingClassifier;

/// Trait for image classifiers
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Name of this backend
    fn name(&self) -> &'static str;

    /// Make sure the model is loaded and reachable
    async fn load(&self) -> Result<()> {
        Ok(())
    }

    /// Exercise the model once so the first real request is fast
    async fn warm_up(&self) -> Result<()>;

    /// Class probabilities for an image, indexed like the label file
    async fn probabilities(&self, image: &Path) -> Result<Vec<f32>>;
}

/// Stand-in used when classification is switched off in the config
pub struct DisabledClassifier;

#[async_trait]
impl Classifier for DisabledClassifier {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn warm_up(&self) -> Result<()> {
        Err(CropError::ClassifierUnavailable("classifier disabled in config".to_string()))
    }

    async fn probabilities(&self, _image: &Path) -> Result<Vec<f32>> {
        Err(CropError::ClassifierUnavailable("classifier disabled in config".to_string()))
    }
}

/// Label vocabulary; line order is class index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Read one label per line. A missing file yields the single label
    /// `Unknown`.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Label file {:?} not found, using a single 'Unknown' label", path);
                Ok(Self::new(vec!["Unknown".to_string()]))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn parse(content: &str) -> Self {
        Self::new(content.lines().map(|l| l.trim().to_string()).collect())
    }

    /// Label for a class index, `Class <idx>` past the end of the vocabulary
    pub fn label(&self, idx: usize) -> String {
        self.labels
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("Class {}", idx))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Top class of one classification
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: f64,
}

/// Index and value of the largest probability; the first wins on ties
pub fn argmax(probs: &[f32]) -> Option<(usize, f32)> {
    probs
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, p)| match best {
            Some((_, top)) if p.is_nan() || p <= top => best,
            _ => Some((i, p)),
        })
}

/// Warm-up progress as published to observers
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Loading { progress: f32, message: &'static str },
    Ready,
    Failed(String),
}

impl Readiness {
    pub fn progress(&self) -> f32 {
        match self {
            Readiness::Loading { progress, .. } => *progress,
            Readiness::Ready | Readiness::Failed(_) => 1.0,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Readiness::Loading { message, .. } => *message,
            Readiness::Ready => "Ready",
            Readiness::Failed(_) => "AI Failed",
        }
    }

    /// Whether warm-up has finished one way or the other
    pub fn is_settled(&self) -> bool {
        !matches!(self, Readiness::Loading { .. })
    }
}

/// Shared classification service
pub struct ClassifierService {
    backend: Arc<dyn Classifier>,
    labels_path: PathBuf,
    labels: OnceLock<LabelSet>,
    status: watch::Sender<Readiness>,
}

impl ClassifierService {
    pub fn new(backend: Arc<dyn Classifier>, labels_path: impl Into<PathBuf>) -> Self {
        let (status, _) = watch::channel(Readiness::Loading {
            progress: 0.0,
            message: "Initializing...",
        });
        Self {
            backend,
            labels_path: labels_path.into(),
            labels: OnceLock::new(),
            status,
        }
    }

    /// Build the configured backend
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let backend: Arc<dyn Classifier> = if config.enabled {
            Arc::new(ServingClassifier::new(config)?)
        } else {
            Arc::new(DisabledClassifier)
        };
        Ok(Self::new(backend, &config.labels_path))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Watch warm-up progress
    pub fn subscribe(&self) -> watch::Receiver<Readiness> {
        self.status.subscribe()
    }

    pub fn readiness(&self) -> Readiness {
        self.status.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.status.borrow() == Readiness::Ready
    }

    fn stage(&self, progress: f32, message: &'static str) {
        debug!("Classifier warm-up {:.0}%: {}", progress * 100.0, message);
        self.status.send_replace(Readiness::Loading { progress, message });
    }

    /// Load labels and warm the model. Progress is published on the
    /// readiness channel; the outcome is also returned.
    pub async fn warm_up(&self) -> Result<()> {
        self.stage(0.1, "Initializing Core...");

        let result = async {
            self.stage(0.3, "Loading Knowledge Base...");
            let labels = LabelSet::load(&self.labels_path)?;
            info!("Loaded {} labels from {:?}", labels.len(), self.labels_path);
            let _ = self.labels.set(labels);

            self.stage(0.5, "Loading Neural Network...");
            self.backend.load().await?;

            self.stage(0.8, "Warming up...");
            self.backend.warm_up().await
        }
        .await;

        match &result {
            Ok(()) => {
                info!("Classifier '{}' ready", self.backend.name());
                self.status.send_replace(Readiness::Ready);
            }
            Err(e) => {
                warn!("AI Fail: {}", e);
                self.status.send_replace(Readiness::Failed(e.to_string()));
            }
        }
        result
    }

    /// Run warm-up on a background task. Dropping the handle does not stop
    /// it; callers that lose interest simply ignore the outcome.
    pub fn spawn_warm_up(self: &Arc<Self>) -> JoinHandle<Result<()>> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.warm_up().await })
    }

    /// Top prediction for an image
    pub async fn classify(&self, image: &Path) -> Result<Prediction> {
        let labels = match (self.is_ready(), self.labels.get()) {
            (true, Some(labels)) => labels,
            _ => {
                return Err(CropError::ClassifierUnavailable(
                    "classifier has not finished warming up".to_string(),
                ))
            }
        };

        let probs = self.backend.probabilities(image).await?;
        let (idx, p) = argmax(&probs)
            .ok_or_else(|| CropError::Inference("model returned no probabilities".to_string()))?;

        Ok(Prediction {
            label: labels.label(idx),
            confidence: f64::from(p),
        })
    }

    /// Care report for an image, or `None` when the classifier is not ready
    /// or inference fails
    pub async fn predict(&self, image: &Path) -> Option<Report> {
        match self.classify(image).await {
            Ok(prediction) => {
                info!(
                    "Prediction for {:?}: {} ({:.0}%)",
                    image,
                    prediction.label,
                    prediction.confidence * 100.0
                );
                Some(knowledge::generate_report(&prediction.label, prediction.confidence))
            }
            Err(e) => {
                warn!("Prediction failed for {:?}: {}", image, e);
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::knowledge::Status;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend returning a fixed probability vector
    pub(crate) struct StubClassifier {
        pub probs: Vec<f32>,
        pub fail_warm_up: bool,
        pub calls: AtomicUsize,
    }

    impl StubClassifier {
        pub(crate) fn new(probs: Vec<f32>) -> Self {
            Self { probs, fail_warm_up: false, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl Classifier for StubClassifier {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn warm_up(&self) -> Result<()> {
            if self.fail_warm_up {
                Err(CropError::ClassifierUnavailable("Model missing".to_string()))
            } else {
                Ok(())
            }
        }

        async fn probabilities(&self, _image: &Path) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.probs.is_empty() {
                Err(CropError::Inference("bad image".to_string()))
            } else {
                Ok(self.probs.clone())
            }
        }
    }

    pub(crate) fn labels_file(dir: &Path) -> PathBuf {
        let path = dir.join("classes.txt");
        std::fs::write(&path, "Tomato___Bacterial_spot\nTomato___Late_blight\nTomato___healthy\n").unwrap();
        path
    }

    #[test]
    fn test_argmax_first_wins() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7, 0.2]), Some((1, 0.7)));
        assert_eq!(argmax(&[]), None);
        assert_eq!(argmax(&[0.2, f32::NAN, 0.5]), Some((2, 0.5)));
    }

    #[test]
    fn test_label_set() {
        let labels = LabelSet::parse("  Apple___scab \nApple___healthy\n");
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.label(0), "Apple___scab");
        assert_eq!(labels.label(7), "Class 7");
    }

    #[test]
    fn test_missing_label_file() {
        let dir = tempfile::tempdir().unwrap();
        let labels = LabelSet::load(&dir.path().join("nope.txt")).unwrap();
        assert_eq!(labels, LabelSet::new(vec!["Unknown".to_string()]));
    }

    #[tokio::test]
    async fn test_predict_before_warm_up_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubClassifier::new(vec![0.1, 0.9, 0.0]));
        let service = ClassifierService::new(stub.clone(), labels_file(dir.path()));

        assert!(!service.is_ready());
        assert!(service.predict(Path::new("leaf.jpg")).await.is_none());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_predict_after_warm_up() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubClassifier::new(vec![0.02, 0.93, 0.05]));
        let service = ClassifierService::new(stub, labels_file(dir.path()));

        service.warm_up().await.unwrap();
        assert_eq!(service.readiness(), Readiness::Ready);

        let report = service.predict(Path::new("leaf.jpg")).await.unwrap();
        assert_eq!(report.status, Status::Infected);
        assert!(report.title.contains("Late blight"));
        assert!(report.details.contains("93.00%"));
    }

    #[tokio::test]
    async fn test_index_past_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubClassifier::new(vec![0.0, 0.0, 0.0, 1.0]));
        let service = ClassifierService::new(stub, labels_file(dir.path()));
        service.warm_up().await.unwrap();

        let prediction = service.classify(Path::new("leaf.jpg")).await.unwrap();
        assert_eq!(prediction.label, "Class 3");
    }

    #[tokio::test]
    async fn test_failed_warm_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut stub = StubClassifier::new(vec![1.0]);
        stub.fail_warm_up = true;
        let service = ClassifierService::new(Arc::new(stub), labels_file(dir.path()));

        assert!(service.warm_up().await.is_err());
        let readiness = service.readiness();
        assert!(matches!(readiness, Readiness::Failed(_)));
        assert_eq!(readiness.message(), "AI Failed");
        assert!(service.predict(Path::new("leaf.jpg")).await.is_none());
    }

    #[tokio::test]
    async fn test_inference_error_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let service = ClassifierService::new(Arc::new(StubClassifier::new(vec![])), labels_file(dir.path()));
        service.warm_up().await.unwrap();
        assert!(service.predict(Path::new("leaf.jpg")).await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_classifier() {
        let config = ClassifierConfig { enabled: false, ..ClassifierConfig::default() };
        let service = ClassifierService::from_config(&config).unwrap();
        assert_eq!(service.backend_name(), "disabled");
        assert!(service.warm_up().await.is_err());
        assert!(service.predict(Path::new("leaf.jpg")).await.is_none());
    }

    #[tokio::test]
    async fn test_background_warm_up_publishes_progress() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(ClassifierService::new(
            Arc::new(StubClassifier::new(vec![1.0])),
            labels_file(dir.path()),
        ));
        let mut rx = service.subscribe();

        let handle = service.spawn_warm_up();
        let settled = rx.wait_for(Readiness::is_settled).await.unwrap().clone();
        assert_eq!(settled, Readiness::Ready);
        assert_eq!(settled.progress(), 1.0);
        assert!(handle.await.unwrap().is_ok());
    }
}
