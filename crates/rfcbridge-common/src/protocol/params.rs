use std::fmt;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Connection parameters handed to the remote session on open.
///
/// Names are lower-cased on insert (`ashost`, `sysnr`, `client`, `user`,
/// `passwd`, `dest`, ...). Serialized as a flat JSON object, so a set of
/// parameters can live in a configuration file:
///
/// ```
/// use rfcbridge_common::ConnectionParameters;
///
/// let params: ConnectionParameters = serde_json::from_str(
///     r#"{"ashost": "10.0.0.1", "sysnr": "00", "client": "100", "user": "demo", "passwd": "secret"}"#,
/// ).unwrap();
/// assert_eq!(params.get("sysnr"), Some("00"));
/// assert!(!format!("{:?}", params).contains("secret"));
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionParameters {
    /// Kept in insertion order; a repeated name replaces the value in place.
    entries: Vec<(String, String)>,
}

impl ConnectionParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters that only name a destination configured on the client host.
    pub fn from_dest(dest: impl Into<String>) -> Self {
        Self::new().with("dest", dest)
    }

    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name.as_ref(), value.into());
        self
    }

    fn insert(&mut self, name: &str, value: String) {
        let name = name.to_ascii_lowercase();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parameters in the order they were added.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ConnectionParameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ConnectionParameters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ParametersVisitor;

        impl<'de> Visitor<'de> for ParametersVisitor {
            type Value = ConnectionParameters;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of parameter names to text values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut params = ConnectionParameters::new();
                while let Some((name, value)) = access.next_entry::<String, String>()? {
                    params.insert(&name, value);
                }
                Ok(params)
            }
        }

        deserializer.deserialize_map(ParametersVisitor)
    }
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in &self.entries {
            if k == "passwd" {
                map.entry(k, &"********");
            } else {
                map.entry(k, v);
            }
        }
        map.finish()
    }
}
