//! Prepared statement tracking.
//!
//! Statements prepared on a connection are cached by their SQL text, so a
//! repeated execute skips the prepare round trip. A prepare that is still
//! in flight is tracked as a [`PendingPrepare`] until its terminal marker
//! arrives.

use std::collections::HashMap;

use crate::messages::server::PrepareOkMessage;
use crate::types::ColumnDef;
use crate::value::Value;

/// A fully described statement, ready to execute.
#[derive(Debug, Clone)]
pub struct PreparedStatementEntry {
    pub statement_id: u32,
    pub params: Vec<ColumnDef>,
    pub columns: Vec<ColumnDef>,
}

/// A prepare in flight, holding the values that triggered it so the
/// execute can be sent as soon as the statement is fully described.
#[derive(Debug)]
pub struct PendingPrepare {
    pub sql: String,
    pub values: Vec<Value>,
    pub response: Option<PrepareOkMessage>,
    pub params: Vec<ColumnDef>,
    pub columns: Vec<ColumnDef>,
}

impl PendingPrepare {
    pub fn new(sql: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            values,
            response: None,
            params: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Record a definition packet. Parameters arrive before columns; the
    /// prepare response says how many of each to expect.
    pub fn push_descriptor(&mut self, col: ColumnDef) {
        let param_count = self.response.map_or(0, |r| usize::from(r.param_count));
        if self.params.len() < param_count {
            self.params.push(col);
        } else {
            self.columns.push(col);
        }
    }

    /// Convert into a cache entry once the terminal marker has arrived.
    pub fn into_entry(self) -> Option<(String, Vec<Value>, PreparedStatementEntry)> {
        let response = self.response?;
        Some((
            self.sql,
            self.values,
            PreparedStatementEntry {
                statement_id: response.statement_id,
                params: self.params,
                columns: self.columns,
            },
        ))
    }
}

/// Per-connection statement cache keyed by SQL text.
#[derive(Debug, Default)]
pub struct StatementCache {
    entries: HashMap<String, PreparedStatementEntry>,
}

impl StatementCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sql: &str) -> Option<&PreparedStatementEntry> {
        self.entries.get(sql)
    }

    pub fn insert(&mut self, sql: String, entry: PreparedStatementEntry) {
        self.entries.insert(sql, entry);
    }

    pub fn contains(&self, sql: &str) -> bool {
        self.entries.contains_key(sql)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
