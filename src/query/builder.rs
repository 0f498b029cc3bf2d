//! Fluent constructors for structured queries.

use crate::query::ast::{
    Delete, Insert, Operator, OrderBy, Relation, Select, StructuredQuery, Term, Update,
};

/// Starts a `SELECT` against `table`.
pub fn select(table: impl Into<String>) -> Select {
    Select {
        table: table.into(),
        ..Select::default()
    }
}

/// Starts an `INSERT` into `table`.
pub fn insert_into(table: impl Into<String>) -> Insert {
    Insert {
        table: table.into(),
        ..Insert::default()
    }
}

/// Starts an `UPDATE` of `table`.
pub fn update(table: impl Into<String>) -> Update {
    Update {
        table: table.into(),
        ..Update::default()
    }
}

/// Starts a `DELETE` from `table`.
pub fn delete_from(table: impl Into<String>) -> Delete {
    Delete {
        table: table.into(),
        ..Delete::default()
    }
}

/// Positional bind marker, for structured queries that are later prepared.
pub fn placeholder() -> Term {
    Term::Placeholder
}

fn relation(column: impl Into<String>, op: Operator, term: impl Into<Term>) -> Relation {
    Relation {
        column: column.into(),
        op,
        term: term.into(),
    }
}

fn in_list<I, T>(terms: I) -> Term
where
    I: IntoIterator<Item = T>,
    T: Into<Term>,
{
    Term::List(terms.into_iter().map(Into::into).collect())
}

impl Select {
    /// Sets the projected columns.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a relation with an arbitrary operator.
    pub fn where_op(
        mut self,
        column: impl Into<String>,
        op: Operator,
        term: impl Into<Term>,
    ) -> Self {
        self.relations.push(relation(column, op, term));
        self
    }

    /// Adds `column = term`.
    pub fn where_eq(self, column: impl Into<String>, term: impl Into<Term>) -> Self {
        self.where_op(column, Operator::Eq, term)
    }

    /// Adds `column IN (terms...)`.
    pub fn where_in<I, T>(self, column: impl Into<String>, terms: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Term>,
    {
        self.where_op(column, Operator::In, in_list(terms))
    }

    /// Orders ascending by `column`.
    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            descending: false,
        });
        self
    }

    /// Orders descending by `column`.
    pub fn order_by_desc(mut self, column: impl Into<String>) -> Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            descending: true,
        });
        self
    }

    /// Caps the number of returned rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Appends `ALLOW FILTERING`.
    pub fn allow_filtering(mut self) -> Self {
        self.allow_filtering = true;
        self
    }
}

impl Insert {
    /// Adds a column value.
    pub fn value(mut self, column: impl Into<String>, term: impl Into<Term>) -> Self {
        self.values.push((column.into(), term.into()));
        self
    }

    /// Appends `IF NOT EXISTS`.
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// Adds `USING TTL seconds`.
    pub fn ttl(mut self, seconds: u32) -> Self {
        self.ttl = Some(seconds);
        self
    }
}

impl Update {
    /// Adds `column = term` to the `SET` clause.
    pub fn set(mut self, column: impl Into<String>, term: impl Into<Term>) -> Self {
        self.assignments.push((column.into(), term.into()));
        self
    }

    /// Adds `column = term` to the `WHERE` clause.
    pub fn where_eq(mut self, column: impl Into<String>, term: impl Into<Term>) -> Self {
        self.relations.push(relation(column, Operator::Eq, term));
        self
    }

    /// Adds `USING TTL seconds`.
    pub fn ttl(mut self, seconds: u32) -> Self {
        self.ttl = Some(seconds);
        self
    }
}

impl Delete {
    /// Restricts the delete to specific columns.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Adds `column = term` to the `WHERE` clause.
    pub fn where_eq(mut self, column: impl Into<String>, term: impl Into<Term>) -> Self {
        self.relations.push(relation(column, Operator::Eq, term));
        self
    }

    /// Adds `column IN (terms...)`.
    pub fn where_in<I, T>(mut self, column: impl Into<String>, terms: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Term>,
    {
        self.relations.push(relation(column, Operator::In, in_list(terms)));
        self
    }
}

impl From<Select> for StructuredQuery {
    fn from(value: Select) -> Self {
        StructuredQuery::Select(value)
    }
}

impl From<Insert> for StructuredQuery {
    fn from(value: Insert) -> Self {
        StructuredQuery::Insert(value)
    }
}

impl From<Update> for StructuredQuery {
    fn from(value: Update) -> Self {
        StructuredQuery::Update(value)
    }
}

impl From<Delete> for StructuredQuery {
    fn from(value: Delete) -> Self {
        StructuredQuery::Delete(value)
    }
}
