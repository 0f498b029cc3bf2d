#![forbid(unsafe_code)]

//! Conversion between native [`Value`]s and the driver's [`WireValue`]s.
//!
//! Encoding runs over bind values before a prepared statement is bound; decoding turns a
//! driver [`ResultSet`] into [`Record`]s. Built-in variants always encode. Application
//! types wrapped with [`Value::custom`] go through an [`EncoderRegistry`], which is
//! process-wide by default and can be replaced per [`Codec`].

mod record;
mod value;
mod wire;

use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use time::OffsetDateTime;

use crate::error::{Error, Result};

pub use record::Record;
pub use value::{CustomValue, Uuid, Value};
pub use wire::{ColumnSpec, ResultSet, WireValue};

type EncodeFn = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Result<WireValue> + Send + Sync>;

/// Extensible table of encoders for application types.
///
/// Registering an encoder for a type that already has one replaces it. Replacement is
/// not atomic with respect to encodes already in flight on other threads.
#[derive(Default)]
pub struct EncoderRegistry {
    encoders: RwLock<FxHashMap<TypeId, EncodeFn>>,
}

static GLOBAL_REGISTRY: OnceLock<Arc<EncoderRegistry>> = OnceLock::new();

impl EncoderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by [`Codec::default`].
    pub fn global() -> Arc<EncoderRegistry> {
        GLOBAL_REGISTRY
            .get_or_init(|| Arc::new(EncoderRegistry::new()))
            .clone()
    }

    /// Registers `encode` for values of type `T`.
    pub fn register<T, F>(&self, encode: F)
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> Result<WireValue> + Send + Sync + 'static,
    {
        let erased: EncodeFn = Arc::new(move |value: &(dyn Any + Send + Sync)| {
            match value.downcast_ref::<T>() {
                Some(typed) => encode(typed),
                None => Err(Error::Invalid(format!(
                    "encoder for {} received a value of another type",
                    std::any::type_name::<T>()
                ))),
            }
        });
        self.encoders.write().insert(TypeId::of::<T>(), erased);
    }

    /// Removes the encoder for `T`, returning whether one was registered.
    pub fn unregister<T: Any>(&self) -> bool {
        self.encoders.write().remove(&TypeId::of::<T>()).is_some()
    }

    /// Whether an encoder is registered for `T`.
    pub fn contains<T: Any>(&self) -> bool {
        self.encoders.read().contains_key(&TypeId::of::<T>())
    }

    fn lookup(&self, type_id: TypeId) -> Option<EncodeFn> {
        self.encoders.read().get(&type_id).cloned()
    }
}

/// Encoder/decoder pair bound to an [`EncoderRegistry`].
#[derive(Clone)]
pub struct Codec {
    registry: Arc<EncoderRegistry>,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            registry: EncoderRegistry::global(),
        }
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec").finish_non_exhaustive()
    }
}

impl Codec {
    /// Uses `registry` instead of the process-wide one.
    pub fn with_registry(registry: Arc<EncoderRegistry>) -> Self {
        Self { registry }
    }

    /// The registry consulted for custom values.
    pub fn registry(&self) -> &Arc<EncoderRegistry> {
        &self.registry
    }

    /// Encodes a single value.
    pub fn encode(&self, value: &Value) -> Result<WireValue> {
        self.encode_at(0, value)
    }

    /// Encodes bind values, preserving their order.
    pub fn encode_values(&self, values: &[Value]) -> Result<Vec<WireValue>> {
        values
            .iter()
            .enumerate()
            .map(|(index, value)| self.encode_at(index, value))
            .collect()
    }

    fn encode_at(&self, index: usize, value: &Value) -> Result<WireValue> {
        let encode_all = |items: &[Value]| -> Result<Vec<WireValue>> {
            items.iter().map(|item| self.encode_at(index, item)).collect()
        };
        Ok(match value {
            Value::Null => WireValue::Null,
            Value::Bool(v) => WireValue::Boolean(*v),
            Value::TinyInt(v) => WireValue::TinyInt(*v),
            Value::SmallInt(v) => WireValue::SmallInt(*v),
            Value::Int(v) => WireValue::Int(*v),
            Value::BigInt(v) => WireValue::BigInt(*v),
            Value::Float(v) => WireValue::Float(*v),
            Value::Double(v) => WireValue::Double(*v),
            Value::Text(v) => WireValue::Text(v.clone()),
            Value::Bytes(v) => WireValue::Blob(v.clone()),
            Value::Timestamp(v) => WireValue::Timestamp(timestamp_millis(*v)),
            Value::Uuid(v) => WireValue::Uuid(v.0),
            Value::Inet(v) => WireValue::Inet(*v),
            Value::List(items) => WireValue::List(encode_all(items)?),
            Value::Set(items) => WireValue::Set(encode_all(items)?),
            Value::Tuple(items) => WireValue::Tuple(encode_all(items)?),
            Value::Map(entries) => WireValue::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((self.encode_at(index, k)?, self.encode_at(index, v)?)))
                    .collect::<Result<_>>()?,
            ),
            Value::Udt { type_name, fields } => WireValue::Udt {
                type_name: type_name.clone(),
                fields: fields
                    .iter()
                    .map(|(name, v)| Ok((name.clone(), self.encode_at(index, v)?)))
                    .collect::<Result<_>>()?,
            },
            Value::Custom(custom) => {
                let encoder =
                    self.registry
                        .lookup(custom.type_id())
                        .ok_or(Error::Encoding {
                            index,
                            type_name: custom.type_name(),
                        })?;
                encoder(custom.as_any())?
            }
        })
    }
}

fn timestamp_millis(value: OffsetDateTime) -> i64 {
    value.unix_timestamp_nanos().div_euclid(1_000_000) as i64
}

/// Decodes a single wire value.
pub fn decode_value(value: &WireValue) -> Result<Value> {
    decode_cell("<value>", value)
}

fn decode_cell(column: &str, value: &WireValue) -> Result<Value> {
    let decode_all = |items: &[WireValue]| -> Result<Vec<Value>> {
        items.iter().map(|item| decode_cell(column, item)).collect()
    };
    Ok(match value {
        WireValue::Null => Value::Null,
        WireValue::Boolean(v) => Value::Bool(*v),
        WireValue::TinyInt(v) => Value::TinyInt(*v),
        WireValue::SmallInt(v) => Value::SmallInt(*v),
        WireValue::Int(v) => Value::Int(*v),
        WireValue::BigInt(v) | WireValue::Counter(v) => Value::BigInt(*v),
        WireValue::Float(v) => Value::Float(*v),
        WireValue::Double(v) => Value::Double(*v),
        WireValue::Ascii(v) | WireValue::Text(v) => Value::Text(v.clone()),
        WireValue::Blob(v) => Value::Bytes(v.clone()),
        WireValue::Timestamp(millis) => {
            let nanos = i128::from(*millis) * 1_000_000;
            let instant = OffsetDateTime::from_unix_timestamp_nanos(nanos)
                .map_err(|err| Error::decode(column, format!("timestamp {millis}ms: {err}")))?;
            Value::Timestamp(instant)
        }
        WireValue::Uuid(v) | WireValue::TimeUuid(v) => Value::Uuid(Uuid(*v)),
        WireValue::Inet(v) => Value::Inet(*v),
        WireValue::List(items) => Value::List(decode_all(items)?),
        WireValue::Set(items) => Value::Set(decode_all(items)?),
        WireValue::Tuple(items) => Value::Tuple(decode_all(items)?),
        WireValue::Map(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((decode_cell(column, k)?, decode_cell(column, v)?)))
                .collect::<Result<_>>()?,
        ),
        WireValue::Udt { type_name, fields } => Value::Udt {
            type_name: type_name.clone(),
            fields: fields
                .iter()
                .map(|(name, v)| Ok((name.clone(), decode_cell(column, v)?)))
                .collect::<Result<_>>()?,
        },
        WireValue::Custom { type_name, .. } => {
            return Err(Error::decode(
                column,
                format!("no decoding for custom type {type_name}"),
            ))
        }
    })
}

/// Converts a column name to its canonical key form.
///
/// ASCII letters are lowercased and every character outside `[a-z0-9_]` becomes `_`,
/// so keys are usable as struct field names.
pub fn canonical_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            let lower = c.to_ascii_lowercase();
            if lower.is_ascii_lowercase() || lower.is_ascii_digit() || lower == '_' {
                lower
            } else {
                '_'
            }
        })
        .collect()
}

/// Decodes one row against its column metadata.
pub fn decode_row(columns: &[ColumnSpec], row: &[WireValue], keywordize: bool) -> Result<Record> {
    if columns.len() != row.len() {
        return Err(Error::decode(
            "<row>",
            format!("row has {} cells for {} columns", row.len(), columns.len()),
        ));
    }
    let mut record = Record::with_capacity(columns.len());
    for (column, cell) in columns.iter().zip(row) {
        let key = if keywordize {
            canonical_key(&column.name)
        } else {
            column.name.clone()
        };
        // the same column selected twice is fine; distinct names sharing a key are not
        if let Some(earlier) = record.keys().position(|existing| existing == key) {
            let earlier = &columns[earlier].name;
            if *earlier != column.name {
                return Err(Error::decode(
                    &column.name,
                    format!("key `{key}` already taken by column `{earlier}`"),
                ));
            }
        }
        record.push(key, decode_cell(&column.name, cell)?);
    }
    Ok(record)
}

/// Decodes every row of `result`, preserving row order.
pub fn decode_result_set(result: &ResultSet, keywordize: bool) -> Result<Vec<Record>> {
    result.records(keywordize).collect()
}
