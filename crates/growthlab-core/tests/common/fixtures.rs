//! Test fixture loading utilities

use std::path::PathBuf;

use growthlab_core::Subject;

/// Get the path to a fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("test_fixtures")
        .join(name)
}

/// Load a subjects fixture
pub fn load_subjects(name: &str) -> Vec<Subject> {
    let path = fixture_path(&format!("subjects/{}", name));
    let content = std::fs::read_to_string(&path)
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", path.display()));
    serde_json::from_str(&content)
        .unwrap_or_else(|e| panic!("Invalid subjects fixture {}: {}", name, e))
}

/// Subject sampled on days `[0, 3, 6, 9]`
#[allow(dead_code)]
pub fn four_point_subject(id: &str, group: &str, values: [f64; 4]) -> Subject {
    Subject::new(id, group, vec![0.0, 3.0, 6.0, 9.0], values.to_vec())
}
