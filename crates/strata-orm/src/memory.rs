//! In-memory persistence collaborator.
//!
//! Tables are plain row vectors behind one mutex. Every save, delete and
//! destroy is recorded in an operation log so callers can assert on exactly
//! what reached the backend, and in which order.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use strata_config::EntityDefaults;

use crate::error::PersistenceError;
use crate::model::BackingSource;
use crate::persistence::{
    Criteria, Database, Persistence, Relation, RowDelete, RowWrite, Validator, WriteOutcome,
};
use crate::types::TypeTag;
use crate::value::{Row, Value};

/// One call that reached the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Save { table: String, write: RowWrite },
    Delete { table: String, key: Value },
    Destroy { table: String, criteria: Criteria },
}

impl Operation {
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::Save { table, .. } | Self::Delete { table, .. } | Self::Destroy { table, .. } => {
                table
            }
        }
    }
}

#[derive(Default)]
struct Table {
    rows: Vec<Row>,
    last_id: i64,
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Table>,
    columns: HashMap<String, IndexMap<String, TypeTag>>,
    relations: HashMap<(String, String), Value>,
    validators: HashMap<String, Arc<dyn Validator>>,
    failing: HashSet<String>,
    defaults: EntityDefaults,
    log: Vec<Operation>,
}

/// Shared in-memory database. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

impl MemoryDatabase {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// This database as the engine's collaborator handle.
    #[must_use]
    pub fn database(&self) -> Arc<dyn Database> {
        Arc::new(self.clone())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Column types reported for `table`.
    #[must_use]
    pub fn with_columns<I, S>(self, table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = (S, TypeTag)>,
        S: Into<String>,
    {
        self.lock().columns.insert(
            table.to_string(),
            columns.into_iter().map(|(name, ty)| (name.into(), ty)).collect(),
        );
        self
    }

    #[must_use]
    pub fn with_defaults(self, defaults: EntityDefaults) -> Self {
        self.lock().defaults = defaults;
        self
    }

    /// Validator handed to entities of `model` that configure none.
    #[must_use]
    pub fn with_validator(self, model: &str, validator: Arc<dyn Validator>) -> Self {
        self.lock().validators.insert(model.to_string(), validator);
        self
    }

    /// Value returned by the lazy loader for relation `name` of `table`.
    #[must_use]
    pub fn with_relation(self, table: &str, name: &str, value: Value) -> Self {
        self.lock()
            .relations
            .insert((table.to_string(), name.to_string()), value);
        self
    }

    /// Make every subsequent operation on `table` fail.
    pub fn fail_table(&self, table: &str) {
        self.lock().failing.insert(table.to_string());
    }

    /// Seed a row without logging an operation.
    pub fn insert_row(&self, table: &str, row: Row) {
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .rows
            .push(row);
    }

    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().log.clone()
    }

    pub fn clear_operations(&self) {
        self.lock().log.clear();
    }
}

impl Database for MemoryDatabase {
    fn bind(&self, source: &BackingSource, model: &str, pk: &str) -> Arc<dyn Persistence> {
        let table = match source {
            BackingSource::Table(name) | BackingSource::ModelClass(name) => name.clone(),
            BackingSource::Model | BackingSource::Virtual | BackingSource::View => {
                model.to_string()
            }
        };
        Arc::new(MemoryTable {
            table,
            pk: pk.to_string(),
            state: Arc::clone(&self.state),
        })
    }

    fn defaults(&self) -> EntityDefaults {
        self.lock().defaults.clone()
    }

    fn validator(&self, model: &str) -> Option<Arc<dyn Validator>> {
        self.lock().validators.get(model).cloned()
    }
}

struct MemoryTable {
    table: String,
    pk: String,
    state: Arc<Mutex<State>>,
}

struct LoadedRelation(Value);

impl Relation for LoadedRelation {
    fn get_relation(&self) -> Value {
        self.0.clone()
    }
}

/// Value to store for a column, given its current value.
fn resolve(value: &Value, current: &Value) -> Value {
    match value {
        Value::Express(express) => express.apply(current),
        Value::Raw(raw) => Value::Text(raw.expression.clone()),
        other => other.clone(),
    }
}

impl MemoryTable {
    fn lock(&self) -> Result<MutexGuard<'_, State>, PersistenceError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.failing.contains(&self.table) {
            return Err(PersistenceError::Query(format!(
                "table {} is unavailable",
                self.table
            )));
        }
        Ok(state)
    }

    fn writable(&self, write: &RowWrite) -> Vec<(String, Value)> {
        write
            .row
            .iter()
            .filter(|(name, _)| write.allow.contains(name) || **name == self.pk)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

impl Persistence for MemoryTable {
    fn save(&self, write: &RowWrite) -> Result<WriteOutcome, PersistenceError> {
        let mut state = self.lock()?;
        state.log.push(Operation::Save {
            table: self.table.clone(),
            write: write.clone(),
        });
        let table = state.tables.entry(self.table.clone()).or_default();

        if write.is_update() {
            let mut matched = false;
            for row in &mut table.rows {
                let hit = write.criteria.as_ref().map_or_else(
                    || !write.key.is_null() && row.get(&self.pk) == Some(&write.key),
                    |criteria| criteria.matches(row, &self.pk),
                );
                if !hit {
                    continue;
                }
                matched = true;
                for (name, value) in self.writable(write) {
                    let current = row.get(&name).cloned().unwrap_or_default();
                    row.insert(name, resolve(&value, &current));
                }
            }
            return Ok(if matched {
                WriteOutcome::Written { key: None }
            } else {
                WriteOutcome::Rejected
            });
        }

        let mut row: Row = self
            .writable(write)
            .into_iter()
            .map(|(name, value)| {
                let stored = resolve(&value, &Value::Null);
                (name, stored)
            })
            .collect();
        let provided = row.get(&self.pk).filter(|k| !k.is_null()).cloned();
        let key = if let Some(key) = provided {
            if let Value::Int(id) = key {
                table.last_id = table.last_id.max(id);
            }
            key
        } else {
            table.last_id += 1;
            let key = Value::Int(table.last_id);
            row.insert(self.pk.clone(), key.clone());
            row.move_index(row.len() - 1, 0);
            key
        };

        let existing = table
            .rows
            .iter()
            .position(|r| r.get(&self.pk) == Some(&key));
        match (existing, write.replace) {
            (Some(index), true) => table.rows[index] = row,
            (Some(_), false) => {
                return Err(PersistenceError::Rejected(format!(
                    "duplicate key in {}",
                    self.table
                )));
            }
            (None, _) => table.rows.push(row),
        }
        Ok(WriteOutcome::Written { key: Some(key) })
    }

    fn delete(&self, delete: &RowDelete) -> Result<bool, PersistenceError> {
        let mut state = self.lock()?;
        state.log.push(Operation::Delete {
            table: self.table.clone(),
            key: delete.key.clone(),
        });
        if delete.key.is_null() {
            return Ok(false);
        }
        let table = state.tables.entry(self.table.clone()).or_default();
        let before = table.rows.len();
        table
            .rows
            .retain(|row| row.get(&delete.pk) != Some(&delete.key));
        Ok(table.rows.len() < before)
    }

    fn destroy(&self, criteria: &Criteria, _force: bool) -> Result<bool, PersistenceError> {
        let mut state = self.lock()?;
        state.log.push(Operation::Destroy {
            table: self.table.clone(),
            criteria: criteria.clone(),
        });
        let table = state.tables.entry(self.table.clone()).or_default();
        table.rows.retain(|row| !criteria.matches(row, &self.pk));
        Ok(true)
    }

    fn fields_type(&self) -> IndexMap<String, TypeTag> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .columns
            .get(&self.table)
            .cloned()
            .unwrap_or_default()
    }

    fn relation(&self, name: &str, _row: &Row) -> Option<Box<dyn Relation>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .relations
            .get(&(self.table.clone(), name.to_string()))
            .cloned()
            .map(|value| Box::new(LoadedRelation(value)) as Box<dyn Relation>)
    }
}
