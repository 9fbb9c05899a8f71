//! Event record sent to the hub, and the `key=value` property syntax.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single hub event: opaque body plus application properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(with = "body_serde")]
    pub body: Bytes,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Event {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Attach every well-formed `key=value` entry; entries without `=` are skipped.
    pub fn apply_properties<S: AsRef<str>>(&mut self, properties: &[S]) {
        for p in properties {
            if let Some((k, v)) = parse_property(p.as_ref()) {
                self.properties.insert(k.to_string(), v.to_string());
            }
        }
    }
}

/// Split on the first `=`. Returns `None` for malformed entries.
pub fn parse_property(s: &str) -> Option<(&str, &str)> {
    s.split_once('=')
}

// Bodies travel as UTF-8 text in JSON seed files.
mod body_serde {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&String::from_utf8_lossy(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        let s = String::deserialize(d)?;
        Ok(Bytes::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_property_is_attached() {
        let mut ev = Event::new("x");
        ev.apply_properties(&["k1=v1"]);
        assert_eq!(ev.properties.get("k1").map(String::as_str), Some("v1"));
    }

    #[test]
    fn malformed_property_is_skipped() {
        let mut ev = Event::new("x");
        ev.apply_properties(&["malformed", "a=b=c"]);
        assert_eq!(ev.properties.len(), 1);
        assert_eq!(ev.properties.get("a").map(String::as_str), Some("b=c"));
    }

    #[test]
    fn seed_line_parses() {
        let ev: Event = serde_json::from_str(r#"{"body":"hello","properties":{"k":"v"}}"#).unwrap();
        assert_eq!(ev, Event::new("hello").with_property("k", "v"));
        let bare: Event = serde_json::from_str(r#"{"body":"hi"}"#).unwrap();
        assert!(bare.properties.is_empty());
    }
}
