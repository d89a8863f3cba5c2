use std::collections::HashMap;
use std::fs::File;

use anyhow::Result;
use nginxlog_metrics::{NamespaceConfig, NamespaceError};
use proptest::prelude::*;
use tempfile::tempdir;

fn namespace(name: &str) -> NamespaceConfig {
    NamespaceConfig {
        name: name.to_string(),
        ..Default::default()
    }
}

#[test]
fn test_deprecated_glob_is_expanded_into_both_fields() -> Result<()> {
    let dir = tempdir()?;
    File::create(dir.path().join("a.log"))?;
    File::create(dir.path().join("b.log"))?;
    File::create(dir.path().join("notes.txt"))?;

    let mut ns = namespace("edge");
    ns.source_files = vec![format!("{}/*.log", dir.path().display())];

    let compiled = ns.compile()?;
    let expected = vec![
        dir.path().join("a.log").to_string_lossy().into_owned(),
        dir.path().join("b.log").to_string_lossy().into_owned(),
    ];
    assert_eq!(compiled.source_data.files, expected);
    assert_eq!(compiled.source_files, expected);
    Ok(())
}

#[test]
fn test_plain_paths_pass_through_next_to_globs() -> Result<()> {
    let dir = tempdir()?;
    File::create(dir.path().join("access.log"))?;

    let mut ns = namespace("edge");
    ns.source_data.files = vec![
        "/var/log/nginx/error.log".to_string(),
        format!("{}/acc*.log", dir.path().display()),
    ];

    let compiled = ns.compile()?;
    assert_eq!(
        compiled.source_data.files,
        vec![
            "/var/log/nginx/error.log".to_string(),
            dir.path().join("access.log").to_string_lossy().into_owned(),
        ]
    );
    Ok(())
}

#[test]
fn test_glob_without_matches_yields_nothing() -> Result<()> {
    let dir = tempdir()?;
    let mut ns = namespace("edge");
    ns.source_data.files = vec![format!("{}/*.log", dir.path().display())];

    let compiled = ns.compile()?;
    assert!(compiled.source_data.files.is_empty());
    Ok(())
}

#[test]
fn test_recompiling_expanded_globs_is_stable() -> Result<()> {
    let dir = tempdir()?;
    File::create(dir.path().join("a.log"))?;

    let mut ns = namespace("edge");
    ns.source_data.files = vec![format!("{}/*.log", dir.path().display())];
    ns.labels.insert("zone".to_string(), "a".to_string());
    ns.labels.insert("region".to_string(), "us".to_string());

    let first = ns.compile()?;
    let second = first.clone().into_inner().compile()?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_bracketed_literal_path_is_kept() -> Result<()> {
    let dir = tempdir()?;
    let literal = dir.path().join("app[1].log");
    File::create(&literal)?;

    let mut ns = namespace("edge");
    ns.source_data.files = vec![
        literal.to_string_lossy().into_owned(),
        format!("{}/app?.log", dir.path().display()),
    ];

    let compiled = ns.clone().compile()?;
    assert_eq!(compiled.source_data.files, ns.source_data.files);
    Ok(())
}

#[test]
fn test_glob_match_with_brackets_survives_recompile() -> Result<()> {
    let dir = tempdir()?;
    File::create(dir.path().join("x[1].log"))?;
    File::create(dir.path().join("y.log"))?;

    let mut ns = namespace("edge");
    ns.source_data.files = vec![format!("{}/*.log", dir.path().display())];

    let first = ns.compile()?;
    assert_eq!(first.source_data.files.len(), 2);
    let second = first.clone().into_inner().compile()?;
    assert_eq!(first, second);
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_non_utf8_file_name_is_matched() -> Result<()> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempdir()?;
    File::create(dir.path().join(OsStr::from_bytes(b"b\xff.log")))?;

    let mut ns = namespace("edge");
    ns.source_data.files = vec![format!("{}/*.log", dir.path().display())];

    let first = ns.compile()?;
    assert_eq!(first.source_data.files.len(), 1);
    assert!(first.source_data.files[0].ends_with("b\u{FFFD}.log"));
    let second = first.clone().into_inner().compile()?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_syslog_source_is_untouched() -> Result<()> {
    let ns: NamespaceConfig = toml::from_str(
        r#"
        name = "syslog"
        source = { syslog = { listen_address = "udp://0.0.0.0:5531", format = "rfc3164" } }
        "#,
    )?;

    let compiled = ns.clone().compile()?;
    assert_eq!(compiled.source_data, ns.source_data);
    assert!(compiled.source_data.files.is_empty());
    Ok(())
}

#[test]
fn test_bad_pattern_is_reported() {
    let mut ns = namespace("edge");
    ns.source_data.files = vec!["/var/log/***.log".to_string()];

    assert!(matches!(
        ns.compile(),
        Err(NamespaceError::GlobExpansion { .. })
    ));
}

proptest! {
    #[test]
    fn prop_ordered_labels_are_sorted_and_parallel(
        labels in proptest::collection::hash_map("[a-z_]{1,8}", "[a-z0-9]{0,6}", 0..12)
    ) {
        let mut ns = namespace("prop");
        ns.labels = labels.clone();
        ns.order_labels();

        prop_assert_eq!(ns.ordered_label_names.len(), labels.len());
        prop_assert!(ns.ordered_label_names.windows(2).all(|w| w[0] < w[1]));
        for (name, value) in ns.ordered_label_names.iter().zip(&ns.ordered_label_values) {
            prop_assert_eq!(&labels[name], value);
        }
    }

    #[test]
    fn prop_label_order_ignores_insertion_order(
        pairs in proptest::collection::vec(("[a-z]{1,6}", "[a-z]{1,6}"), 0..10)
    ) {
        let forward: HashMap<String, String> = pairs.iter().cloned().collect();
        let mut backward = HashMap::new();
        for (k, v) in pairs.iter().rev() {
            backward.entry(k.clone()).or_insert_with(|| v.clone());
        }
        // same key set either way; values may differ on duplicate keys
        let mut a = namespace("a");
        a.labels = forward;
        a.order_labels();
        let mut b = namespace("b");
        b.labels = backward;
        b.order_labels();

        prop_assert_eq!(a.ordered_label_names, b.ordered_label_names);
    }
}
