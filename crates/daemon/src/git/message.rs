// Commit message composition for automatic syncs.
//
// Format:
//   no paths      `{prefix}: {timestamp}`
//   one path      `{prefix}: {file name} - {timestamp}`
//   several paths `{prefix}: {n} files changed - {timestamp}`

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

/// Timestamp layout used in commit messages.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How many paths `preview_paths` lists before summarizing the rest.
const PREVIEW_LIMIT: usize = 5;

/// Default prefix when none is configured.
pub const DEFAULT_COMMIT_PREFIX: &str = "Auto-commit";

pub fn compose_commit_message<Tz>(prefix: &str, paths: &[PathBuf], at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let prefix = match prefix.trim() {
        "" => DEFAULT_COMMIT_PREFIX,
        trimmed => trimmed,
    };
    let timestamp = at.format(TIMESTAMP_FORMAT);

    match paths {
        [] => format!("{prefix}: {timestamp}"),
        [single] => format!("{prefix}: {} - {timestamp}", display_name(single)),
        many => format!("{prefix}: {} files changed - {timestamp}", many.len()),
    }
}

/// Short, log-friendly listing of the first few paths.
pub fn preview_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return String::from("(none)");
    }

    let mut listed = paths
        .iter()
        .take(PREVIEW_LIMIT)
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if paths.len() > PREVIEW_LIMIT {
        listed.push_str(&format!(" and {} more", paths.len() - PREVIEW_LIMIT));
    }
    listed
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
