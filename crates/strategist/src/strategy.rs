//! The strategy document stored in `strategies.json`.

use crate::error::StrategistError;
use serde::{Deserialize, Serialize};

/// One user-authored strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    /// Six uppercase letters, unique within the store.
    pub code_name: String,
    pub readable_name: String,
    /// `major.minor`, non-decreasing across edits.
    pub version: String,
    pub description: String,
    /// 0 (safe) .. 2 (dangerous); display only.
    pub risk_level: u8,
    /// Chunk width for parallel simulation; `None` simulates in one chunk.
    pub parallel_simulation_chunk_days: Option<u32>,
    pub indicators_script: String,
    pub decision_script: String,
}

impl Strategy {
    /// Validate the code-name and version formats.
    pub fn validate(&self) -> Result<(), StrategistError> {
        if !is_code_name(&self.code_name) {
            return Err(StrategistError::BadCodeName(self.code_name.clone()));
        }
        if parse_version(&self.version).is_none() {
            return Err(StrategistError::BadVersion(self.version.clone()));
        }
        Ok(())
    }
}

/// `[A-Z]{6}`.
pub fn is_code_name(s: &str) -> bool {
    s.len() == 6 && s.chars().all(|c| c.is_ascii_uppercase())
}

/// `\d+\.\d+` parsed as `(major, minor)`.
pub fn parse_version(s: &str) -> Option<(u32, u32)> {
    let (major, minor) = s.split_once('.')?;
    if major.is_empty() || minor.is_empty() {
        return None;
    }
    if !major.bytes().all(|b| b.is_ascii_digit()) || !minor.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((major.parse().ok()?, minor.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(code_name: &str, version: &str) -> Strategy {
        Strategy {
            code_name: code_name.into(),
            readable_name: "Test".into(),
            version: version.into(),
            description: String::new(),
            risk_level: 0,
            parallel_simulation_chunk_days: None,
            indicators_script: String::new(),
            decision_script: String::new(),
        }
    }

    #[test]
    fn test_code_name_shape() {
        assert!(is_code_name("ABCDEF"));
        assert!(!is_code_name("ABCDE"));
        assert!(!is_code_name("ABCDEFG"));
        assert!(!is_code_name("abcdef"));
        assert!(!is_code_name("ABC123"));
    }

    #[test]
    fn test_version_shape() {
        assert_eq!(parse_version("1.0"), Some((1, 0)));
        assert_eq!(parse_version("12.34"), Some((12, 34)));
        assert_eq!(parse_version("1"), None);
        assert_eq!(parse_version("1."), None);
        assert_eq!(parse_version("a.b"), None);
        assert_eq!(parse_version("1.0.0"), None);
    }

    #[test]
    fn test_validate() {
        assert!(strategy("ABCDEF", "1.0").validate().is_ok());
        assert!(matches!(
            strategy("oops", "1.0").validate(),
            Err(StrategistError::BadCodeName(_))
        ));
        assert!(matches!(
            strategy("ABCDEF", "one").validate(),
            Err(StrategistError::BadVersion(_))
        ));
    }
}
