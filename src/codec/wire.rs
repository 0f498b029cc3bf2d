//! Driver-side value and result representation.

use std::net::IpAddr;

use bytes::Bytes;

use crate::codec::{decode_row, Record, Uuid};
use crate::error::Result;

/// Value as carried by the driver's protocol layer.
#[derive(Clone, Debug, PartialEq)]
pub enum WireValue {
    /// Null cell.
    Null,
    /// `boolean`
    Boolean(bool),
    /// `tinyint`
    TinyInt(i8),
    /// `smallint`
    SmallInt(i16),
    /// `int`
    Int(i32),
    /// `bigint`
    BigInt(i64),
    /// `counter`
    Counter(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// `ascii`
    Ascii(String),
    /// `text` / `varchar`
    Text(String),
    /// `blob`
    Blob(Bytes),
    /// `timestamp`, milliseconds since the Unix epoch.
    Timestamp(i64),
    /// `uuid`
    Uuid([u8; 16]),
    /// `timeuuid`
    TimeUuid([u8; 16]),
    /// `inet`
    Inet(IpAddr),
    /// `list<T>`
    List(Vec<WireValue>),
    /// `set<T>`
    Set(Vec<WireValue>),
    /// `map<K, V>`
    Map(Vec<(WireValue, WireValue)>),
    /// `tuple<...>`
    Tuple(Vec<WireValue>),
    /// User-defined type.
    Udt {
        /// Name of the user-defined type.
        type_name: String,
        /// Field values in declaration order.
        fields: Vec<(String, WireValue)>,
    },
    /// Server type with no native mapping.
    Custom {
        /// Server-side class or type name.
        type_name: String,
        /// Serialized payload.
        payload: Bytes,
    },
}

/// Column metadata reported alongside a result set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name exactly as the server reports it.
    pub name: String,
    /// CQL type name, when the driver supplies one.
    pub cql_type: Option<String>,
}

impl ColumnSpec {
    /// Creates a column with an unknown type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cql_type: None,
        }
    }

    /// Annotates the column with its CQL type.
    pub fn with_type(mut self, cql_type: impl Into<String>) -> Self {
        self.cql_type = Some(cql_type.into());
        self
    }
}

/// Tabular result returned by a session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSet {
    /// Column metadata, one entry per cell in each row.
    pub columns: Vec<ColumnSpec>,
    /// Rows in server order.
    pub rows: Vec<Vec<WireValue>>,
    /// Trace session id when tracing was requested.
    pub tracing_id: Option<Uuid>,
    /// Opaque paging state for fetching the next page.
    pub paging_state: Option<Bytes>,
}

impl ResultSet {
    /// Builds a result set from column names and rows.
    pub fn new<I, S>(columns: I, rows: Vec<Vec<WireValue>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(ColumnSpec::new).collect(),
            rows,
            tracing_id: None,
            paging_state: None,
        }
    }

    /// A result with no columns and no rows (e.g. the outcome of a write).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Attaches a trace session id.
    pub fn with_tracing_id(mut self, id: Uuid) -> Self {
        self.tracing_id = Some(id);
        self
    }

    /// Attaches paging state.
    pub fn with_paging_state(mut self, state: impl Into<Bytes>) -> Self {
        self.paging_state = Some(state.into());
        self
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` when the result carries no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Lazily decodes rows in order.
    pub fn records(&self, keywordize: bool) -> impl Iterator<Item = Result<Record>> + '_ {
        self.rows
            .iter()
            .map(move |row| decode_row(&self.columns, row, keywordize))
    }
}
