//! Minimal parameterized SELECT builder that relation handlers append tenant
//! constraints to.

use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: only from config/metadata).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// A SELECT under construction: base statement plus conjunctive WHERE
/// clauses, with positional params.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    table: String,
    wheres: Vec<String>,
    pub params: Vec<Value>,
}

impl SelectQuery {
    pub fn for_table(table: impl Into<String>) -> Self {
        SelectQuery {
            table: table.into(),
            wheres: Vec::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }

    /// `column = value` conjunct.
    pub fn and_where_eq(&mut self, column: &str, value: Value) -> &mut Self {
        let n = self.push_param(value);
        self.wheres.push(format!("{} = ${}", quoted(column), n));
        self
    }

    /// EXISTS conjunct against a pivot/related table joined on the outer
    /// table's key, constrained by one of its own columns.
    pub fn and_where_exists(
        &mut self,
        related_table: &str,
        related_join_column: &str,
        outer_key_column: &str,
        constrained_column: &str,
        value: Value,
    ) -> &mut Self {
        let n = self.push_param(value);
        self.wheres.push(format!(
            "EXISTS (SELECT 1 FROM {rel} WHERE {rel}.{join} = {outer}.{key} AND {rel}.{col} = ${n})",
            rel = quoted(related_table),
            join = quoted(related_join_column),
            outer = quoted(&self.table),
            key = quoted(outer_key_column),
            col = quoted(constrained_column),
            n = n,
        ));
        self
    }

    pub fn to_sql(&self) -> String {
        let mut sql = format!("SELECT * FROM {}", quoted(&self.table));
        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.wheres.join(" AND "));
        }
        sql
    }
}
