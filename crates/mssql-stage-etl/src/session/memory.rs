//! In-memory [`SqlSession`] for unit tests.

use super::{SqlSession, TextRow};
use crate::constraints::ForeignKeyDescriptor;
use crate::error::{MigrateError, Result};
use crate::identifier::TableName;
use crate::statement::InsertStatement;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

pub(crate) struct MemorySession {
    label: String,
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    tables: BTreeMap<String, Vec<TextRow>>,
    foreign_keys: Vec<ForeignKeyDescriptor>,
    fail_constraint: Option<String>,
    fail_insert_after: Option<usize>,
    fail_commit: bool,
    truncate_keeps_rows: bool,
    inserts: usize,
    transaction: Option<Vec<(String, TextRow)>>,
    operations: Vec<String>,
}

impl MemorySession {
    pub(crate) fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn add_table(&self, name: &str, rows: Vec<TextRow>) {
        self.state().tables.insert(name.to_string(), rows);
    }

    pub(crate) fn add_existing_foreign_key(&self, fk: ForeignKeyDescriptor) {
        self.state().foreign_keys.push(fk);
    }

    /// Drop and add of this constraint fail.
    pub(crate) fn fail_on_constraint(&self, name: &str) {
        self.state().fail_constraint = Some(name.to_string());
    }

    pub(crate) fn clear_constraint_failure(&self) {
        self.state().fail_constraint = None;
    }

    /// The next `n` inserts succeed, every one after that fails.
    pub(crate) fn fail_insert_after(&self, n: usize) {
        let mut state = self.state();
        state.fail_insert_after = Some(state.inserts + n);
    }

    /// COMMIT fails and leaves the transaction open.
    pub(crate) fn fail_commit(&self) {
        self.state().fail_commit = true;
    }

    /// TRUNCATE succeeds but leaves the rows in place.
    pub(crate) fn truncate_keeps_rows(&self) {
        self.state().truncate_keeps_rows = true;
    }

    pub(crate) fn rows(&self, name: &str) -> Option<Vec<TextRow>> {
        self.state().tables.get(name).cloned()
    }

    pub(crate) fn foreign_key_names(&self) -> Vec<String> {
        self.state()
            .foreign_keys
            .iter()
            .map(|fk| fk.constraint_name.clone())
            .collect()
    }

    pub(crate) fn in_transaction(&self) -> bool {
        self.state().transaction.is_some()
    }

    pub(crate) fn operations(&self) -> Vec<String> {
        self.state().operations.clone()
    }
}

impl MemoryState {
    fn check_constraint(&self, fk: &ForeignKeyDescriptor) -> Result<()> {
        if self.fail_constraint.as_deref() == Some(fk.constraint_name.as_str()) {
            return Err(MigrateError::transfer(
                fk.child_table.to_string(),
                format!("constraint {} rejected", fk.constraint_name),
            ));
        }
        Ok(())
    }

    fn table_mut(&mut self, table: &TableName) -> Result<&mut Vec<TextRow>> {
        self.tables
            .get_mut(&table.to_string())
            .ok_or_else(|| MigrateError::SchemaObjectMissing(table.to_string()))
    }
}

#[async_trait]
impl SqlSession for MemorySession {
    fn label(&self) -> &str {
        &self.label
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn foreign_keys(&self) -> Result<Vec<ForeignKeyDescriptor>> {
        Ok(self.state().foreign_keys.clone())
    }

    async fn drop_foreign_key(&self, fk: &ForeignKeyDescriptor) -> Result<()> {
        let mut state = self.state();
        state.check_constraint(fk)?;
        let before = state.foreign_keys.len();
        state
            .foreign_keys
            .retain(|existing| existing.constraint_name != fk.constraint_name);
        if state.foreign_keys.len() == before {
            return Err(MigrateError::SchemaObjectMissing(fk.constraint_name.clone()));
        }
        state.operations.push(format!("drop {}", fk.constraint_name));
        Ok(())
    }

    async fn add_foreign_key(&self, fk: &ForeignKeyDescriptor) -> Result<()> {
        let mut state = self.state();
        state.check_constraint(fk)?;
        if state
            .foreign_keys
            .iter()
            .any(|existing| existing.constraint_name == fk.constraint_name)
        {
            return Err(MigrateError::transfer(
                fk.child_table.to_string(),
                format!("constraint {} already exists", fk.constraint_name),
            ));
        }
        state.foreign_keys.push(fk.clone());
        state.operations.push(format!("add {}", fk.constraint_name));
        Ok(())
    }

    async fn select_all(&self, table: &TableName) -> Result<Vec<TextRow>> {
        let mut state = self.state();
        let rows = state.table_mut(table)?.clone();
        state.operations.push(format!("select {}", table));
        Ok(rows)
    }

    async fn truncate(&self, table: &TableName) -> Result<()> {
        let mut state = self.state();
        let keep = state.truncate_keeps_rows;
        let rows = state.table_mut(table)?;
        if !keep {
            rows.clear();
        }
        state.operations.push(format!("truncate {}", table));
        Ok(())
    }

    async fn count_rows(&self, table: &TableName) -> Result<i64> {
        let mut state = self.state();
        Ok(state.table_mut(table)?.len() as i64)
    }

    async fn insert(&self, stmt: &InsertStatement) -> Result<u64> {
        let mut state = self.state();
        let name = stmt.table().to_string();
        if !state.tables.contains_key(&name) {
            return Err(MigrateError::SchemaObjectMissing(name));
        }
        if let Some(limit) = state.fail_insert_after {
            if state.inserts >= limit {
                return Err(MigrateError::transfer(name, "insert rejected"));
            }
        }
        state.inserts += 1;

        let row: TextRow = stmt
            .values()
            .iter()
            .map(|v| Some(v.render_literal()))
            .collect();
        if let Some(pending) = state.transaction.as_mut() {
            pending.push((name, row));
            return Ok(1);
        }
        state.table_mut(stmt.table())?.push(row);
        Ok(1)
    }

    async fn begin_transaction(&self) -> Result<()> {
        let mut state = self.state();
        state.transaction = Some(Vec::new());
        state.operations.push("begin".to_string());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut state = self.state();
        if state.fail_commit {
            return Err(MigrateError::transfer(self.label.clone(), "commit rejected"));
        }
        let pending = state.transaction.take().unwrap_or_default();
        for (name, row) in pending {
            state.tables.entry(name).or_default().push(row);
        }
        state.operations.push("commit".to_string());
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut state = self.state();
        state.transaction = None;
        state.operations.push("rollback".to_string());
        Ok(())
    }
}
