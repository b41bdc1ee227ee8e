// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Crop Manager

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// User store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Leaf classifier settings
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClassifierConfig {
    /// Disable to run without a model server; scans then produce no report
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Base URL of the model server's REST API
    #[serde(default = "default_url")]
    pub url: String,
    /// Served model name
    #[serde(default = "default_model")]
    pub model: String,
    /// Label vocabulary, one label per line, line order is class index
    #[serde(default = "default_labels_path")]
    pub labels_path: String,
    /// Square input edge in pixels
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
}

// Default value functions
fn default_true() -> bool { true }
fn default_store_path() -> String { "user_data.json".to_string() }
fn default_url() -> String { "http://localhost:8501".to_string() }
fn default_model() -> String { "my_model".to_string() }
fn default_labels_path() -> String { "classes.txt".to_string() }
fn default_input_size() -> u32 { 224 }
fn default_timeout() -> u64 { 60 }
fn default_retries() -> u32 { 2 }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_url(),
            model: default_model(),
            labels_path: default_labels_path(),
            input_size: default_input_size(),
            timeout_secs: default_timeout(),
            retries: default_retries(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::CropError::Config(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> crate::Result<()> {
        if self.store.path.trim().is_empty() {
            return Err(crate::CropError::Config("store.path must not be empty".to_string()));
        }
        if self.classifier.input_size == 0 {
            return Err(crate::CropError::Config(
                "classifier.input_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
