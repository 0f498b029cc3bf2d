//! Default structured-query compiler producing CQL text.

use std::fmt::Write as _;

use crate::error::{Error, Result};
use crate::query::ast::{
    Delete, Insert, Operator, OrderBy, Relation, Select, StructuredQuery, Term, Update,
};

/// Compiles a structured query into CQL text.
///
/// The function is pure: equal inputs always yield identical text.
pub fn render(query: &StructuredQuery) -> Result<String> {
    let mut out = String::with_capacity(64);
    match query {
        StructuredQuery::Select(q) => render_select(&mut out, q)?,
        StructuredQuery::Insert(q) => render_insert(&mut out, q)?,
        StructuredQuery::Update(q) => render_update(&mut out, q)?,
        StructuredQuery::Delete(q) => render_delete(&mut out, q)?,
    }
    out.push(';');
    Ok(out)
}

fn render_select(out: &mut String, q: &Select) -> Result<()> {
    out.push_str("SELECT ");
    if q.columns.is_empty() {
        out.push('*');
    } else {
        push_identifiers(out, &q.columns);
    }
    out.push_str(" FROM ");
    push_table(out, &q.table)?;
    push_relations(out, &q.relations)?;
    push_order_by(out, &q.order_by);
    if let Some(limit) = q.limit {
        let _ = write!(out, " LIMIT {limit}");
    }
    if q.allow_filtering {
        out.push_str(" ALLOW FILTERING");
    }
    Ok(())
}

fn render_insert(out: &mut String, q: &Insert) -> Result<()> {
    if q.values.is_empty() {
        return Err(Error::Compile(format!("INSERT into {} has no values", q.table)));
    }
    out.push_str("INSERT INTO ");
    push_table(out, &q.table)?;
    out.push_str(" (");
    for (i, (column, _)) in q.values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        push_identifier(out, column);
    }
    out.push_str(") VALUES (");
    for (i, (_, term)) in q.values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        push_term(out, term);
    }
    out.push(')');
    if q.if_not_exists {
        out.push_str(" IF NOT EXISTS");
    }
    if let Some(ttl) = q.ttl {
        let _ = write!(out, " USING TTL {ttl}");
    }
    Ok(())
}

fn render_update(out: &mut String, q: &Update) -> Result<()> {
    if q.assignments.is_empty() {
        return Err(Error::Compile(format!("UPDATE of {} has no SET clause", q.table)));
    }
    if q.relations.is_empty() {
        return Err(Error::Compile(format!("UPDATE of {} has no WHERE clause", q.table)));
    }
    out.push_str("UPDATE ");
    push_table(out, &q.table)?;
    if let Some(ttl) = q.ttl {
        let _ = write!(out, " USING TTL {ttl}");
    }
    out.push_str(" SET ");
    for (i, (column, term)) in q.assignments.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        push_identifier(out, column);
        out.push_str(" = ");
        push_term(out, term);
    }
    push_relations(out, &q.relations)
}

fn render_delete(out: &mut String, q: &Delete) -> Result<()> {
    if q.relations.is_empty() {
        return Err(Error::Compile(format!("DELETE from {} has no WHERE clause", q.table)));
    }
    out.push_str("DELETE ");
    if !q.columns.is_empty() {
        push_identifiers(out, &q.columns);
        out.push(' ');
    }
    out.push_str("FROM ");
    push_table(out, &q.table)?;
    push_relations(out, &q.relations)
}

fn push_table(out: &mut String, table: &str) -> Result<()> {
    if table.is_empty() || table.split('.').any(str::is_empty) {
        return Err(Error::Compile(format!("invalid table name '{table}'")));
    }
    for (i, part) in table.split('.').enumerate() {
        if i > 0 {
            out.push('.');
        }
        push_identifier(out, part);
    }
    Ok(())
}

fn push_relations(out: &mut String, relations: &[Relation]) -> Result<()> {
    for (i, relation) in relations.iter().enumerate() {
        out.push_str(if i == 0 { " WHERE " } else { " AND " });
        push_identifier(out, &relation.column);
        out.push(' ');
        out.push_str(relation.op.as_str());
        out.push(' ');
        if relation.op == Operator::In
            && !matches!(relation.term, Term::List(_) | Term::Placeholder)
        {
            return Err(Error::Compile(format!(
                "IN on '{}' requires a list or placeholder",
                relation.column
            )));
        }
        push_term(out, &relation.term);
    }
    Ok(())
}

fn push_order_by(out: &mut String, order_by: &[OrderBy]) {
    for (i, clause) in order_by.iter().enumerate() {
        out.push_str(if i == 0 { " ORDER BY " } else { ", " });
        push_identifier(out, &clause.column);
        out.push_str(if clause.descending { " DESC" } else { " ASC" });
    }
}

fn push_identifiers(out: &mut String, identifiers: &[String]) {
    for (i, identifier) in identifiers.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        push_identifier(out, identifier);
    }
}

fn is_plain_identifier(identifier: &str) -> bool {
    let mut chars = identifier.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn push_identifier(out: &mut String, identifier: &str) {
    if is_plain_identifier(identifier) {
        out.push_str(identifier);
    } else {
        out.push('"');
        out.push_str(&identifier.replace('"', "\"\""));
        out.push('"');
    }
}

fn push_term(out: &mut String, term: &Term) {
    match term {
        Term::Null => out.push_str("NULL"),
        Term::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
        Term::Int(v) => {
            let _ = write!(out, "{v}");
        }
        Term::Double(v) if v.is_nan() => out.push_str("NaN"),
        Term::Double(v) if v.is_infinite() => {
            out.push_str(if *v > 0.0 { "Infinity" } else { "-Infinity" })
        }
        Term::Double(v) => {
            let _ = write!(out, "{v:?}");
        }
        Term::Text(v) => {
            out.push('\'');
            out.push_str(&v.replace('\'', "''"));
            out.push('\'');
        }
        Term::Blob(v) => {
            out.push_str("0x");
            out.push_str(&hex::encode(v));
        }
        Term::Placeholder => out.push('?'),
        Term::List(items) => {
            out.push('(');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                push_term(out, item);
            }
            out.push(')');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::builder::{delete_from, insert_into, placeholder, select, update};

    fn cql(query: impl Into<StructuredQuery>) -> String {
        render(&query.into()).unwrap()
    }

    #[test]
    fn renders_select_with_relations() {
        assert_eq!(cql(select("t").where_eq("id", 42)), "SELECT * FROM t WHERE id = 42;");
        assert_eq!(
            cql(select("ks.users")
                .columns(["name", "Email"])
                .where_in("id", [1, 2])
                .order_by_desc("ts")
                .limit(10)
                .allow_filtering()),
            "SELECT name, \"Email\" FROM ks.users WHERE id IN (1, 2) ORDER BY ts DESC LIMIT 10 ALLOW FILTERING;"
        );
    }

    #[test]
    fn escapes_text_and_renders_blobs() {
        assert_eq!(
            cql(insert_into("t").value("name", "o'neil").value("raw", vec![0xde_u8, 0xad]).ttl(60)),
            "INSERT INTO t (name, raw) VALUES ('o''neil', 0xdead) USING TTL 60;"
        );
    }

    #[test]
    fn renders_update_and_delete() {
        assert_eq!(
            cql(update("t").set("v", 1.5).where_eq("id", placeholder())),
            "UPDATE t SET v = 1.5 WHERE id = ?;"
        );
        assert_eq!(
            cql(delete_from("t").columns(["v"]).where_eq("id", 1)),
            "DELETE v FROM t WHERE id = 1;"
        );
    }

    #[test]
    fn rejects_incomplete_statements() {
        assert!(matches!(render(&update("t").where_eq("id", 1).into()), Err(Error::Compile(_))));
        assert!(matches!(render(&delete_from("t").into()), Err(Error::Compile(_))));
        assert!(matches!(render(&insert_into("t").into()), Err(Error::Compile(_))));
        assert!(matches!(render(&select("ks.").into()), Err(Error::Compile(_))));
        assert!(matches!(
            render(&select("t").where_op("id", Operator::In, 1).into()),
            Err(Error::Compile(_))
        ));
    }
}
