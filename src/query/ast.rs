//! Structured query descriptions.
//!
//! These are plain values: two descriptions that compare equal always compile to the
//! same text, which is what lets the compiler cache key on them directly.

use std::hash::{Hash, Hasher};

/// A structured CQL statement.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StructuredQuery {
    /// `SELECT`
    Select(Select),
    /// `INSERT`
    Insert(Insert),
    /// `UPDATE`
    Update(Update),
    /// `DELETE`
    Delete(Delete),
}

impl StructuredQuery {
    /// Table the statement targets.
    pub fn table(&self) -> &str {
        match self {
            StructuredQuery::Select(q) => &q.table,
            StructuredQuery::Insert(q) => &q.table,
            StructuredQuery::Update(q) => &q.table,
            StructuredQuery::Delete(q) => &q.table,
        }
    }
}

/// `SELECT` description. An empty column list selects `*`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Select {
    /// Target table, optionally `keyspace.table`.
    pub table: String,
    /// Projected columns.
    pub columns: Vec<String>,
    /// `WHERE` relations joined by `AND`.
    pub relations: Vec<Relation>,
    /// `ORDER BY` clauses.
    pub order_by: Vec<OrderBy>,
    /// `LIMIT`
    pub limit: Option<u64>,
    /// Appends `ALLOW FILTERING`.
    pub allow_filtering: bool,
}

/// `INSERT` description.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Insert {
    /// Target table.
    pub table: String,
    /// Column/value pairs in insertion order.
    pub values: Vec<(String, Term)>,
    /// Appends `IF NOT EXISTS`.
    pub if_not_exists: bool,
    /// `USING TTL` in seconds.
    pub ttl: Option<u32>,
}

/// `UPDATE` description.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Update {
    /// Target table.
    pub table: String,
    /// `SET` assignments.
    pub assignments: Vec<(String, Term)>,
    /// `WHERE` relations.
    pub relations: Vec<Relation>,
    /// `USING TTL` in seconds.
    pub ttl: Option<u32>,
}

/// `DELETE` description. An empty column list deletes whole rows.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Delete {
    /// Target table.
    pub table: String,
    /// Columns to delete.
    pub columns: Vec<String>,
    /// `WHERE` relations.
    pub relations: Vec<Relation>,
}

/// Comparison operator in a `WHERE` relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `=`
    Eq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `IN`
    In,
}

impl Operator {
    /// CQL spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::In => "IN",
        }
    }
}

/// One `column op term` relation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Relation {
    /// Column on the left-hand side.
    pub column: String,
    /// Operator.
    pub op: Operator,
    /// Right-hand side; `IN` expects [`Term::List`] or a placeholder.
    pub term: Term,
}

/// One `ORDER BY` clause.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OrderBy {
    /// Clustering column.
    pub column: String,
    /// `DESC` when true.
    pub descending: bool,
}

/// Literal or placeholder inside a structured query.
#[derive(Clone, Debug)]
pub enum Term {
    /// `NULL`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Floating-point literal.
    Double(f64),
    /// Quoted string literal.
    Text(String),
    /// `0x...` blob literal.
    Blob(Vec<u8>),
    /// Positional `?` marker.
    Placeholder,
    /// Parenthesized list, used by `IN`.
    List(Vec<Term>),
}

// Doubles compare by bit pattern so every term can be a cache key.
impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Term::Null, Term::Null) | (Term::Placeholder, Term::Placeholder) => true,
            (Term::Bool(a), Term::Bool(b)) => a == b,
            (Term::Int(a), Term::Int(b)) => a == b,
            (Term::Double(a), Term::Double(b)) => a.to_bits() == b.to_bits(),
            (Term::Text(a), Term::Text(b)) => a == b,
            (Term::Blob(a), Term::Blob(b)) => a == b,
            (Term::List(a), Term::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Term {}

impl Hash for Term {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Term::Null | Term::Placeholder => {}
            Term::Bool(v) => v.hash(state),
            Term::Int(v) => v.hash(state),
            Term::Double(v) => v.to_bits().hash(state),
            Term::Text(v) => v.hash(state),
            Term::Blob(v) => v.hash(state),
            Term::List(v) => v.hash(state),
        }
    }
}

impl From<bool> for Term {
    fn from(value: bool) -> Self {
        Term::Bool(value)
    }
}

impl From<i32> for Term {
    fn from(value: i32) -> Self {
        Term::Int(i64::from(value))
    }
}

impl From<i64> for Term {
    fn from(value: i64) -> Self {
        Term::Int(value)
    }
}

impl From<f64> for Term {
    fn from(value: f64) -> Self {
        Term::Double(value)
    }
}

impl From<&str> for Term {
    fn from(value: &str) -> Self {
        Term::Text(value.to_owned())
    }
}

impl From<String> for Term {
    fn from(value: String) -> Self {
        Term::Text(value)
    }
}

impl From<Vec<u8>> for Term {
    fn from(value: Vec<u8>) -> Self {
        Term::Blob(value)
    }
}

impl<T: Into<Term>> From<Option<T>> for Term {
    fn from(value: Option<T>) -> Self {
        value.map_or(Term::Null, Into::into)
    }
}
