//! Label encoding for categorical features.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Code assigned to category values never seen during training. Encoding
/// is total: arbitrary agent-supplied values map here instead of failing.
pub const UNSEEN_CODE: i64 = -1;

/// Injective finite map from category value to integer code, plus the
/// explicit unseen sentinel. Built once at training time, immutable after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelEncoder {
    codes: HashMap<String, i64>,
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit the encoder over the observed values. Codes are assigned in
    /// sorted value order so refitting the same data yields the same map.
    pub fn fit<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut classes: Vec<String> = values.into_iter().map(str::to_string).collect();
        classes.sort();
        classes.dedup();
        let codes = classes
            .iter()
            .enumerate()
            .map(|(i, v)| (v.clone(), i as i64))
            .collect();
        Self { codes, classes }
    }

    pub fn encode(&self, value: &str) -> i64 {
        self.codes.get(value).copied().unwrap_or(UNSEEN_CODE)
    }

    pub fn decode(&self, code: i64) -> Option<&str> {
        if code < 0 {
            return None;
        }
        self.classes.get(code as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let enc = LabelEncoder::fit(["Europe", "LATAM", "Africa", "Europe"]);
        assert_eq!(enc.len(), 3);
        let code = enc.encode("LATAM");
        assert_eq!(enc.decode(code), Some("LATAM"));
    }

    #[test]
    fn unseen_values_map_to_sentinel() {
        let enc = LabelEncoder::fit(["Europe"]);
        assert_eq!(enc.encode("Atlantis"), UNSEEN_CODE);
        assert_eq!(enc.decode(UNSEEN_CODE), None);
    }

    #[test]
    fn fit_is_order_independent() {
        let a = LabelEncoder::fit(["b", "a", "c"]);
        let b = LabelEncoder::fit(["c", "b", "a"]);
        assert_eq!(a.encode("b"), b.encode("b"));
    }
}
