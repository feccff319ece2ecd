// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use libfuzzer_sys::fuzz_target;

use imagesaid::naming::{clean_filename, MAX_NAME_CHARS};
use imagesaid::settings::SettingsDocument;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);

    let name = clean_filename(&text);
    assert!(name.chars().count() <= MAX_NAME_CHARS);
    assert!(!name.contains(['/', '\\', ':', '*', '?', '<', '>', '|', '"']));

    if let Ok(doc) = serde_json::from_str::<SettingsDocument>(&text) {
        let (_, templates) = doc.into_parts();
        assert!(templates.get("default").is_some());
    }
});
