//! Strategy-private persistent state.
//!
//! A symbol-keyed dictionary of values a strategy carries between ticks.
//! Opaque to the core: the platform only stores, clones, and serializes it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One scribbled value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScribbleValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl ScribbleValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// symbol → key → value.
pub type Scribbles = HashMap<String, HashMap<String, ScribbleValue>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scribbles_roundtrip_json() {
        let mut scribbles: Scribbles = HashMap::new();
        scribbles
            .entry("BTCUSDT".into())
            .or_default()
            .insert("last_entry_ms".into(), ScribbleValue::Number(1.7e12));
        scribbles
            .entry("BTCUSDT".into())
            .or_default()
            .insert("armed".into(), ScribbleValue::Flag(true));

        let json = serde_json::to_string(&scribbles).unwrap();
        let back: Scribbles = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scribbles);
    }
}
