// Property-based tests for the access-file library

use access_common::config::{FormatConfig, Settings};
use access_common::converter::FormatRegistry;
use access_common::models::{RecordMetadata, RecordType, RunCounters, RunOptions};
use access_common::rights::{evaluate, passes, RightsDecision};
use proptest::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn meta(legal: String, contractual: String) -> RecordMetadata {
    RecordMetadata {
        filename: Some("master.tif".to_string()),
        other_restrictions: Some(legal),
        contractual_status: Some(contractual),
    }
}

/// *For any* pair of restriction codes, a record passes exactly when the
/// legal code is at most 1 and the contractual code is at least 3.
#[test]
fn property_rights_threshold() {
    proptest!(|(legal in -5i64..10, contractual in -5i64..10, label in "[A-Za-z ]{0,12}")| {
        let decision = evaluate(&meta(format!("{};{}", legal, label), contractual.to_string())).unwrap();
        let expected = legal <= 1 && contractual >= 3;
        prop_assert_eq!(decision.passes(), expected);
        if legal > 1 {
            prop_assert_eq!(decision, RightsDecision::LegallyRestricted(legal));
        }
    });
}

/// *For any* code, only the first `;` token is read
#[test]
fn property_rights_ignore_trailing_tokens() {
    proptest!(|(code in 0i64..6, tail in "[;0-9a-z ]{0,16}")| {
        let plain = passes(&meta(code.to_string(), "3".to_string())).unwrap();
        let tailed = passes(&meta(format!(" {} ;{}", code, tail), "3".to_string())).unwrap();
        prop_assert_eq!(plain, tailed);
    });
}

/// *For any* non-numeric first token, evaluation is a record error
#[test]
fn property_rights_malformed_codes() {
    proptest!(|(token in "[a-z]{1,8}")| {
        prop_assert!(evaluate(&meta(token, "3".to_string())).is_err());
    });
}

/// *For any* case variant of a configured extension, classification agrees
#[test]
fn property_classification_ignores_case() {
    let registry = FormatRegistry::from_config(&FormatConfig {
        image: ".tif .jpg".to_string(),
        video: ".mov".to_string(),
        audio: ".wav".to_string(),
    });
    let cases = [
        ("tif", RecordType::Image),
        ("jpg", RecordType::Image),
        ("mov", RecordType::Video),
        ("wav", RecordType::Audio),
        ("pdf", RecordType::WebDocument),
    ];
    proptest!(|(index in 0usize..5, mask in prop::collection::vec(any::<bool>(), 3), stem in "[a-z0-9_]{1,10}")| {
        let (ext, expected) = cases[index];
        let mixed: String = ext
            .chars()
            .zip(mask.iter())
            .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c })
            .collect();
        let name = format!("{}.{}", stem, mixed);
        prop_assert_eq!(registry.classify(Path::new(&name)), Some(expected));
    });
}

/// *For any* settings overridden in the config file, loading reflects them
#[test]
fn property_config_file_overrides_defaults() {
    proptest!(|(small in 50u32..300, medium in 300u32..1000, container in "[a-z]{3,12}")| {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        let config = config_json(small, medium, &container);
        fs::write(&path, config).unwrap();

        let settings = Settings::load_from_path(&path).unwrap();
        prop_assert_eq!(settings.thumbnails.small, small);
        prop_assert_eq!(settings.thumbnails.medium, medium);
        prop_assert_eq!(settings.thumbnails.large, Settings::default().thumbnails.large);
        prop_assert_eq!(&settings.storage.container, &container);
        prop_assert!(settings.validate().is_ok());
    });
}

fn config_json(small: u32, medium: u32, container: &str) -> String {
    format!(
        r#"{{"thumbnails": {{"small": {}, "medium": {}}}, "storage": {{"container": "{}"}}}}"#,
        small, medium, container
    )
}

#[test]
fn test_defaults_are_empty() {
    assert!(RunCounters::default().is_partition_of(0));
    let options = RunOptions::default();
    assert!(!options.local && !options.overwrite && !options.dryrun && !options.no_watermark);
}
