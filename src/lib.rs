// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Crop Manager: Local Crop-Leaf Scanner & Farm Inventory
//!
//! Classifies leaf photos with a pre-trained model, turns the result into a
//! care report, and keeps per-user inventory and scan history in a local
//! JSON store.

pub mod app;
pub mod classifier;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod store;

pub use app::{CropManager, Session};
pub use config::AppConfig;
pub use error::{CropError, Result};
