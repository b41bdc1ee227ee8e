// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use crop_manager::knowledge::{generate_report, Status};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    label: String,
    confidence: f64,
}

fuzz_target!(|input: Input| {
    let report = generate_report(&input.label, input.confidence);
    let healthy = report.title.to_lowercase().contains("healthy");
    assert_eq!(report.status == Status::Healthy, healthy);
    assert!(report.details.contains("**PREVENTION:**"));
});
