// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Crop Manager

use thiserror::Error;

/// Result type alias for Crop Manager operations
pub type Result<T> = std::result::Result<T, CropError>;

/// Crop Manager error types
#[derive(Error, Debug)]
pub enum CropError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Classifier not available: {0}")]
    ClassifierUnavailable(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Authentication failed for user '{0}'")]
    Auth(String),
}
