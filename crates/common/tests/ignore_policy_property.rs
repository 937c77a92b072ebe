use std::path::PathBuf;

use autosync_common::ignore::{IgnorePolicy, DEFAULT_IGNORED_DIRS, DEFAULT_IGNORED_SUFFIXES};
use proptest::prelude::*;

// Plain segments: lowercase letters/digits, never an ignored dir name and never
// ending in an ignored suffix.
fn plain_segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,11}".prop_filter("must not collide with ignore rules", |segment| {
        !DEFAULT_IGNORED_DIRS.contains(&segment.as_str())
            && !DEFAULT_IGNORED_SUFFIXES.iter().any(|suffix| segment.ends_with(suffix))
    })
}

fn plain_file_name() -> impl Strategy<Value = String> {
    (plain_segment(), prop::sample::select(vec![".c", ".h", ".md", ".rs", ".toml", ""]))
        .prop_map(|(stem, ext)| format!("{stem}{ext}"))
}

fn join(parts: &[String], separator: char) -> String {
    let mut out = String::from("repo");
    for part in parts {
        out.push(separator);
        out.push_str(part);
    }
    out
}

proptest! {
    #[test]
    fn path_with_ignored_segment_is_ignored(
        prefix in prop::collection::vec(plain_segment(), 0..4),
        dir in prop::sample::select(DEFAULT_IGNORED_DIRS.to_vec()),
        suffix in prop::collection::vec(plain_segment(), 0..3),
        file in plain_file_name(),
        upper in any::<bool>(),
        windows in any::<bool>(),
    ) {
        let policy = IgnorePolicy::default();
        let dir = if upper { dir.to_uppercase() } else { dir.to_string() };

        let mut parts = prefix;
        parts.push(dir);
        parts.extend(suffix);
        parts.push(file);

        let separator = if windows { '\\' } else { '/' };
        let path = join(&parts, separator);
        prop_assert!(policy.should_ignore_str(&path), "expected ignore: {path}");
    }

    #[test]
    fn path_with_ignored_suffix_is_ignored(
        dirs in prop::collection::vec(plain_segment(), 0..4),
        stem in plain_segment(),
        suffix in prop::sample::select(DEFAULT_IGNORED_SUFFIXES.to_vec()),
    ) {
        let policy = IgnorePolicy::default();
        let mut parts = dirs;
        parts.push(format!("{stem}{suffix}"));
        let path = PathBuf::from(join(&parts, '/'));
        prop_assert!(policy.should_ignore(&path), "expected ignore: {}", path.display());
    }

    #[test]
    fn plain_path_is_not_ignored(
        dirs in prop::collection::vec(plain_segment(), 0..5),
        file in plain_file_name(),
        windows in any::<bool>(),
    ) {
        let policy = IgnorePolicy::default();
        let mut parts = dirs;
        parts.push(file);
        let separator = if windows { '\\' } else { '/' };
        let path = join(&parts, separator);
        prop_assert!(!policy.should_ignore_str(&path), "expected keep: {path}");
    }
}
