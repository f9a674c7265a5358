//! Stack version selection.
//!
//! Picks one version out of the list the control plane returns for a
//! region. The expression is either `latest` or a regular expression matched
//! anywhere in the version string. A "locked" `latest` keeps resolving to the
//! version recorded on the first read instead of following new releases.

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::api::StackVersion;

/// Expression that selects the first (newest) record.
pub const LATEST: &str = "latest";

/// Something that carries a stack version string.
pub trait Versioned {
    fn version(&self) -> &str;
}

impl Versioned for StackVersion {
    fn version(&self) -> &str {
        &self.version
    }
}

impl Versioned for String {
    fn version(&self) -> &str {
        self
    }
}

impl Versioned for &str {
    fn version(&self) -> &str {
        self
    }
}

/// Why no version could be selected.
#[derive(Debug, Error)]
pub enum SelectError {
    /// `latest` was requested but the region has no versions.
    #[error("failed to obtain a stack version: no stack versions are available")]
    EmptyInput,

    #[error("failed to compile the version_regex \"{expression}\": {source}")]
    InvalidExpression {
        expression: String,
        #[source]
        source: regex::Error,
    },

    /// `expression` is what the caller wrote; `pinned` is set when a locked
    /// `latest` was rewritten to the recorded version.
    #[error(
        "failed to obtain a stack version matching \"{expression}\"{}: please specify a valid version_regex",
        pinned_note(.pinned)
    )]
    NoMatch {
        expression: String,
        pinned: Option<String>,
    },
}

fn pinned_note(pinned: &Option<String>) -> String {
    match pinned {
        Some(version) => format!(" (locked to \"{}\")", version),
        None => String::new(),
    }
}

/// Select one record from `records`, which must be ordered newest first.
///
/// When `expression` is `latest`, `locked` is set and `pinned_version` is
/// not empty, `pinned_version` is used as the expression. The first matching
/// record in input order wins; versions are never compared.
pub fn select<'a, T: Versioned>(
    expression: &str,
    pinned_version: &str,
    locked: bool,
    records: &'a [T],
) -> Result<&'a T, SelectError> {
    let pinned = expression == LATEST && locked && !pinned_version.is_empty();
    let effective = if pinned { pinned_version } else { expression };

    if effective == LATEST {
        return records.first().ok_or(SelectError::EmptyInput);
    }

    // A pinned version must reproduce exactly, so `7.8.1` never picks `7.8.10`.
    let pattern = if pinned {
        format!("^{}$", regex::escape(effective))
    } else {
        effective.to_string()
    };
    let re = Regex::new(&pattern).map_err(|source| SelectError::InvalidExpression {
        expression: effective.to_string(),
        source,
    })?;

    let found = records.iter().find(|r| re.is_match(r.version()));
    debug!(
        expression,
        effective,
        candidates = records.len(),
        selected = found.map(|r| r.version()),
        "Resolved stack version"
    );

    found.ok_or_else(|| SelectError::NoMatch {
        expression: expression.to_string(),
        pinned: pinned.then(|| pinned_version.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<StackVersion> {
        ["7.9.1", "7.9.0", "7.8.1", "7.8.0"]
            .into_iter()
            .map(StackVersion::new)
            .collect()
    }

    #[test]
    fn test_exact_version() {
        let records = records();
        let stack = select("7.9.0", "", false, &records).unwrap();
        assert_eq!(stack.version, "7.9.0");
    }

    #[test]
    fn test_first_match_wins() {
        let records = records();
        let stack = select("7.8.?", "", false, &records).unwrap();
        assert_eq!(stack.version, "7.8.1");
    }

    #[test]
    fn test_latest_is_first_record() {
        let records = records();
        let stack = select(LATEST, "", false, &records).unwrap();
        assert_eq!(stack.version, "7.9.1");
        assert!(std::ptr::eq(stack, &records[0]));
    }

    #[test]
    fn test_latest_ignores_pin_when_unlocked() {
        let records = records();
        let stack = select(LATEST, "7.8.1", false, &records).unwrap();
        assert_eq!(stack.version, "7.9.1");
    }

    #[test]
    fn test_locked_latest_uses_pinned_version() {
        let records = records();
        let stack = select(LATEST, "7.8.1", true, &records).unwrap();
        assert_eq!(stack.version, "7.8.1");
    }

    #[test]
    fn test_locked_pin_is_exact() {
        let records: Vec<StackVersion> = ["7.8.10", "7.8.1"]
            .into_iter()
            .map(StackVersion::new)
            .collect();
        let stack = select(LATEST, "7.8.1", true, &records).unwrap();
        assert_eq!(stack.version, "7.8.1");
    }

    #[test]
    fn test_locked_without_pin_is_latest() {
        let records = records();
        let stack = select(LATEST, "", true, &records).unwrap();
        assert_eq!(stack.version, "7.9.1");
    }

    #[test]
    fn test_lock_only_applies_to_latest() {
        let records = records();
        let stack = select("7.8.0", "7.9.1", true, &records).unwrap();
        assert_eq!(stack.version, "7.8.0");
    }

    #[test]
    fn test_no_match() {
        let records = vec![StackVersion::new("7.8.0")];
        let err = select("7.9.1", "", false, &records).unwrap_err();
        match &err {
            SelectError::NoMatch { expression, pinned } => {
                assert_eq!(expression, "7.9.1");
                assert!(pinned.is_none());
            },
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(
            err.to_string(),
            "failed to obtain a stack version matching \"7.9.1\": please specify a valid version_regex"
        );
    }

    #[test]
    fn test_locked_pin_missing_names_both() {
        let records = vec![StackVersion::new("7.9.1")];
        let err = select(LATEST, "7.8.1", true, &records).unwrap_err();
        assert!(matches!(
            &err,
            SelectError::NoMatch { expression, pinned: Some(p) } if expression == "latest" && p == "7.8.1"
        ));
        assert_eq!(
            err.to_string(),
            "failed to obtain a stack version matching \"latest\" (locked to \"7.8.1\"): please specify a valid version_regex"
        );
    }

    #[test]
    fn test_invalid_expression() {
        let records = vec![StackVersion::new("7.8.0")];
        let err = select("(?!", "", false, &records).unwrap_err();
        match err {
            SelectError::InvalidExpression { expression, .. } => assert_eq!(expression, "(?!"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_expression_with_empty_records() {
        let records: Vec<StackVersion> = Vec::new();
        assert!(matches!(
            select("7.[", "", false, &records),
            Err(SelectError::InvalidExpression { .. })
        ));
    }

    #[test]
    fn test_latest_with_no_records() {
        let records: Vec<StackVersion> = Vec::new();
        assert!(matches!(
            select(LATEST, "", false, &records),
            Err(SelectError::EmptyInput)
        ));
        assert!(matches!(
            select(LATEST, "", true, &records),
            Err(SelectError::EmptyInput)
        ));
    }

    #[test]
    fn test_regex_on_empty_records_is_no_match() {
        let records: Vec<StackVersion> = Vec::new();
        assert!(matches!(
            select("7.*", "", false, &records),
            Err(SelectError::NoMatch { .. })
        ));
    }

    #[test]
    fn test_unanchored_match_and_suffixes() {
        let records = vec![StackVersion::new("8.0.0-rc1"), StackVersion::new("7.17.3")];
        assert_eq!(select("rc", "", false, &records).unwrap().version, "8.0.0-rc1");
        assert_eq!(select("^7", "", false, &records).unwrap().version, "7.17.3");
    }

    #[test]
    fn test_idempotent() {
        let records = records();
        let first = select("7.8.?", "", false, &records).unwrap();
        let second = select("7.8.?", "", false, &records).unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(records.len(), 4);
    }

    #[test]
    fn test_plain_strings() {
        let versions = vec!["7.10.0".to_string(), "7.9.3".to_string()];
        assert_eq!(select("7.9", "", false, &versions).unwrap(), "7.9.3");
    }
}
