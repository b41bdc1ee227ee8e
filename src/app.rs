// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Application wiring: store plus classifier, and per-user sessions

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::classifier::ClassifierService;
use crate::knowledge::Report;
use crate::store::{
    Category, HistoryEntry, InventoryItem, InventoryStats, JsonStore, Quantity, Registration,
    UserRepository,
};
use crate::{AppConfig, Result};

/// Everything a front end needs, built once at startup
#[derive(Clone)]
pub struct CropManager {
    repo: Arc<dyn UserRepository>,
    classifier: Arc<ClassifierService>,
}

impl CropManager {
    /// Open the configured store and build the classifier service.
    /// Warm-up is left to the caller.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let repo = JsonStore::open(&config.store.path);
        let classifier = ClassifierService::from_config(&config.classifier)?;
        Ok(Self::with_parts(Arc::new(repo), Arc::new(classifier)))
    }

    pub fn with_parts(repo: Arc<dyn UserRepository>, classifier: Arc<ClassifierService>) -> Self {
        Self { repo, classifier }
    }

    pub fn classifier(&self) -> &Arc<ClassifierService> {
        &self.classifier
    }

    pub fn register(&self, username: &str, password: &str) -> Registration {
        self.repo.register_user(username, password)
    }

    /// Start a session if the credentials check out
    pub fn login(&self, username: &str, password: &str) -> Option<Session> {
        if self.repo.verify_user(username, password) {
            info!("User '{}' signed in", username);
            Some(Session {
                username: username.to_string(),
                repo: Arc::clone(&self.repo),
                classifier: Arc::clone(&self.classifier),
            })
        } else {
            warn!("Invalid login for '{}'", username);
            None
        }
    }
}

/// An authenticated user
#[derive(Clone)]
pub struct Session {
    username: String,
    repo: Arc<dyn UserRepository>,
    classifier: Arc<ClassifierService>,
}

impl Session {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn add_item(&self, name: &str, category: Category, qty: Quantity, notes: &str) -> Option<String> {
        self.repo.add_item(&self.username, name, category, qty, notes)
    }

    pub fn inventory(&self) -> Vec<InventoryItem> {
        self.repo.get_inventory(&self.username)
    }

    pub fn delete_item(&self, item_id: &str) {
        self.repo.delete_item(&self.username, item_id)
    }

    pub fn stats(&self) -> InventoryStats {
        self.repo.get_stats(&self.username)
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.repo.get_history(&self.username)
    }

    /// Classify an image and log the result. `None` means no report could
    /// be produced and nothing was logged.
    pub async fn scan(&self, image: &Path) -> Option<Report> {
        let report = self.classifier.predict(image).await?;
        self.repo.log_scan(&self.username, image, &report);
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::tests::{labels_file, StubClassifier};
    use crate::knowledge::Status;

    fn manager(dir: &Path, probs: Vec<f32>) -> CropManager {
        let repo = JsonStore::open(dir.join("user_data.json"));
        let classifier = ClassifierService::new(Arc::new(StubClassifier::new(probs)), labels_file(dir));
        CropManager::with_parts(Arc::new(repo), Arc::new(classifier))
    }

    #[test]
    fn test_login() {
        let dir = tempfile::tempdir().unwrap();
        let app = manager(dir.path(), vec![1.0]);
        assert!(app.register("alice", "x").is_ok());
        assert_eq!(app.login("alice", "x").unwrap().username(), "alice");
        assert!(app.login("alice", "nope").is_none());
        assert!(app.login("admin", "admin").is_some());
    }

    #[test]
    fn test_session_inventory() {
        let dir = tempfile::tempdir().unwrap();
        let app = manager(dir.path(), vec![1.0]);
        app.register("alice", "x");
        let session = app.login("alice", "x").unwrap();

        let id = session
            .add_item("Urea", Category::Fertilizer, Quantity::from("2 bags"), "")
            .unwrap();
        assert_eq!(session.stats().other, 1);
        session.delete_item(&id);
        assert!(session.inventory().is_empty());
    }

    #[tokio::test]
    async fn test_scan_logs_history() {
        let dir = tempfile::tempdir().unwrap();
        let app = manager(dir.path(), vec![0.0, 0.1, 0.9]);
        let session = app.login("admin", "admin").unwrap();

        assert!(session.scan(Path::new("photos/leaf.jpg")).await.is_none());
        assert!(session.history().is_empty());

        app.classifier().warm_up().await.unwrap();
        let report = session.scan(Path::new("photos/leaf.jpg")).await.unwrap();
        assert_eq!(report.status, Status::Healthy);

        let history = session.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].file, "leaf.jpg");
        assert_eq!(history[0].result, report.title);
    }

    #[test]
    fn test_blocking_warm_up() {
        let dir = tempfile::tempdir().unwrap();
        let app = manager(dir.path(), vec![1.0]);
        tokio_test::block_on(app.classifier().warm_up()).unwrap();
        assert!(app.classifier().is_ready());
    }
}
