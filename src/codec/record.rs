//! Decoded rows and their serde bridge.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::codec::Value;
use crate::error::{Error, Result};

/// One decoded row: column keys mapped to values, in result-set column order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Appends a column. Keys are not deduplicated; lookups return the first match.
    pub fn push(&mut self, key: impl Into<String>, value: Value) {
        self.fields.push((key.into(), value));
    }

    /// Looks up a column by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// `true` when the record has no columns.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Column keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Iterates `(key, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Consumes the record into its pairs.
    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }

    /// Renders the record as a JSON object.
    ///
    /// Blobs become base64 strings, timestamps milliseconds since the epoch, UUIDs and
    /// addresses their textual forms. Custom values cannot be rendered.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|err| Error::decode("<record>", err))
    }

    /// Deserializes the record into a user type whose field names match the keys.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let json = self.to_json()?;
        serde_json::from_value(json).map_err(|err| Error::decode("<record>", err))
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::TinyInt(v) => serializer.serialize_i8(*v),
            Value::SmallInt(v) => serializer.serialize_i16(*v),
            Value::Int(v) => serializer.serialize_i32(*v),
            Value::BigInt(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f32(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::Text(v) => serializer.serialize_str(v),
            Value::Bytes(v) => serializer.serialize_str(&STANDARD.encode(v)),
            Value::Timestamp(v) => {
                let millis = v.unix_timestamp_nanos().div_euclid(1_000_000);
                serializer.serialize_i64(millis as i64)
            }
            Value::Uuid(v) => serializer.collect_str(v),
            Value::Inet(v) => serializer.collect_str(v),
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::Udt { fields, .. } => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
            Value::Custom(custom) => Err(S::Error::custom(format!(
                "custom value of type {} has no serde representation",
                custom.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: i32,
        name: String,
        email: Option<String>,
    }

    fn user_record() -> Record {
        let mut record = Record::new();
        record.push("id", Value::Int(42));
        record.push("name", Value::Text("ada".into()));
        record.push("email", Value::Null);
        record
    }

    #[test]
    fn lookup_preserves_column_order() {
        let record = user_record();
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["id", "name", "email"]);
        assert_eq!(record.get("name"), Some(&Value::Text("ada".into())));
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn decodes_into_user_struct() {
        let user: User = user_record().decode().unwrap();
        assert_eq!(
            user,
            User {
                id: 42,
                name: "ada".into(),
                email: None
            }
        );
    }

    #[test]
    fn json_renders_blobs_as_base64() {
        let mut record = Record::new();
        record.push("payload", Value::Bytes(vec![1u8, 2, 3].into()));
        let json = record.to_json().unwrap();
        assert_eq!(json["payload"], serde_json::json!("AQID"));
    }

    #[test]
    fn custom_values_refuse_json() {
        let mut record = Record::new();
        record.push("opaque", Value::custom(5u8));
        assert!(matches!(record.to_json(), Err(Error::Decode { .. })));
    }
}
