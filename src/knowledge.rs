// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Care advice for classifier labels
//!
//! Turns a raw classifier label and its confidence into a human-readable
//! [`Report`]. Everything here is pure: the same inputs always produce the
//! same report.

use serde::{Deserialize, Serialize};
use std::fmt;

const HEALTHY_GLYPH: &str = "✅";
const INFECTED_GLYPH: &str = "⚠️";

/// Plant health verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Healthy,
    Infected,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Healthy => "Healthy",
            Status::Infected => "Infected",
        }
    }

    fn glyph(&self) -> &'static str {
        match self {
            Status::Healthy => HEALTHY_GLYPH,
            Status::Infected => INFECTED_GLYPH,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Advisory text for one condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advice {
    pub cause: &'static str,
    pub symptoms: &'static str,
    pub treatment: &'static str,
    pub prevention: &'static str,
}

/// Advisory table. Matching walks it top to bottom, so order matters.
static ADVICE: [(&str, Advice); 5] = [
    (
        "bacterial_spot",
        Advice {
            cause: "Bacterial infection (Xanthomonas)",
            symptoms: "Small, water-soaked spots on leaves turning brown/black.",
            treatment: "Apply copper-based fungicides. Remove infected leaves.",
            prevention: "Avoid overhead watering. Rotate crops yearly.",
        },
    ),
    (
        "early_blight",
        Advice {
            cause: "Fungal infection (Alternaria solani)",
            symptoms: "Concentric rings (bullseye pattern) on lower leaves.",
            treatment: "Use bio-fungicides or copper sprays.",
            prevention: "Mulch soil to prevent spore splash. Stake plants.",
        },
    ),
    (
        "late_blight",
        Advice {
            cause: "Water mold (Phytophthora infestans)",
            symptoms: "Large, dark, greasy blotches. White fuzzy growth.",
            treatment: "Use fungicides with chlorothalonil/copper immediately.",
            prevention: "Destroy infected debris. Do not compost.",
        },
    ),
    (
        "powdery_mildew",
        Advice {
            cause: "Fungal spores",
            symptoms: "White, flour-like powder on leaf surfaces.",
            treatment: "Neem oil, sulfur sprays, or baking soda mixture.",
            prevention: "Ensure good air circulation.",
        },
    ),
    (
        "healthy",
        Advice {
            cause: "N/A",
            symptoms: "Leaves are vibrant green and structurally sound.",
            treatment: "Continue current care routine.",
            prevention: "Monitor regularly.",
        },
    ),
];

/// Fallback when no table key matches
pub static GENERIC_ADVICE: Advice = Advice {
    cause: "Unknown pathogen or environmental stress.",
    symptoms: "Visible discoloration or lesions.",
    treatment: "Isolate plant. Consult local agricultural extension.",
    prevention: "Maintain general hygiene.",
};

/// Generated care report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub status: Status,
    pub details: String,
}

impl Report {
    /// Title without the leading status glyph
    pub fn headline(&self) -> &str {
        strip_glyph(&self.title)
    }
}

/// Remove a leading status glyph from a stored report title
pub fn strip_glyph(title: &str) -> &str {
    [HEALTHY_GLYPH, INFECTED_GLYPH]
        .iter()
        .find_map(|g| title.strip_prefix(g))
        .map(str::trim_start)
        .unwrap_or(title)
}

/// Normalize a raw classifier label for display
pub fn clean_label(raw_label: &str) -> String {
    raw_label.replace('_', " ").trim().to_string()
}

/// Find the advisory entry for a normalized label
///
/// Table keys go through the same underscore normalization as labels, so
/// `late_blight` matches "Tomato   Late blight".
pub fn lookup_advice(clean_label: &str) -> (Option<&'static str>, &'static Advice) {
    let lower = clean_label.to_lowercase();
    ADVICE
        .iter()
        .find(|(key, _)| lower.contains(&key.replace('_', " ")))
        .map(|(key, advice)| (Some(*key), advice))
        .unwrap_or((None, &GENERIC_ADVICE))
}

/// Build the care report for a classifier label
pub fn generate_report(raw_label: &str, confidence: f64) -> Report {
    let label = clean_label(raw_label);
    let status = if label.to_lowercase().contains("healthy") {
        Status::Healthy
    } else {
        Status::Infected
    };
    let (_, info) = lookup_advice(&label);

    let details = format!(
        "🔬 **DIAGNOSIS:** {label}\n\
         Confidence: {:.2}%\n\n\
         📋 **SYMPTOMS:**\n{}\n\n\
         💊 **TREATMENT:**\n{}\n\n\
         🛡️ **PREVENTION:**\n{}",
        confidence * 100.0,
        info.symptoms,
        info.treatment,
        info.prevention,
    );

    Report {
        title: format!("{} {}", status.glyph(), label),
        status,
        details,
    }
}
