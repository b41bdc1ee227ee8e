// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use crop_manager::store::StoreDocument;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Whatever the bytes, a usable store comes out and re-serializes
    if let Some(store) = StoreDocument::parse(data).into_store() {
        let bytes = serde_json::to_vec(&store).expect("store serializes");
        assert!(matches!(StoreDocument::parse(&bytes), StoreDocument::Valid(_)));
    }
});
