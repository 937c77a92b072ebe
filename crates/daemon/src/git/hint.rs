// Classifies push/pull diagnostics so the front end can show a useful hint.

use std::sync::OnceLock;

use autosync_common::types::FailureHint;
use regex::Regex;

fn credential_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            vec![
                // SSH key missing or not loaded in the agent.
                Regex::new(r"(?i)permission denied \(publickey[^)]*\)")
                    .expect("publickey pattern should compile"),
                Regex::new(r"(?i)could not read from remote repository")
                    .expect("remote read pattern should compile"),
                Regex::new(r"(?i)host key verification failed")
                    .expect("host key pattern should compile"),
                // HTTPS remotes.
                Regex::new(r"(?i)authentication failed for")
                    .expect("https auth pattern should compile"),
                Regex::new(r"(?i)could not read (username|password) for")
                    .expect("credential prompt pattern should compile"),
                Regex::new(r"(?i)terminal prompts disabled")
                    .expect("terminal prompt pattern should compile"),
                Regex::new(r"(?i)invalid username or (password|token)")
                    .expect("invalid credential pattern should compile"),
                Regex::new(r"(?i)the requested url returned error: 40[13]")
                    .expect("http status pattern should compile"),
            ]
        })
        .as_slice()
}

/// Decide whether a failure looks like missing/refused credentials or a
/// generic remote problem.
pub fn classify_failure(diagnostic: &str) -> FailureHint {
    if credential_patterns().iter().any(|pattern| pattern.is_match(diagnostic)) {
        FailureHint::Credentials
    } else {
        FailureHint::Remote
    }
}
