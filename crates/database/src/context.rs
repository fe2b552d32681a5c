//! Execution context handed to plans and to the command executor.

use crate::database::Database;
use crate::executor::Executor;
use hashbrown::HashMap;
use marrow_core::{Error, Result, Value};
use marrow_storage::Transaction;
use std::sync::Arc;

/// Named parameters of a parameterized query.
#[derive(Clone, Debug, Default)]
pub struct Parameters {
    values: HashMap<String, Value>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a parameter, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Everything an operation needs: the database, the transaction it runs in
/// and the query parameters.
pub struct ExecutionContext<'db> {
    db: &'db Database,
    txn: Arc<Transaction>,
    params: Parameters,
}

impl<'db> ExecutionContext<'db> {
    pub fn new(db: &'db Database, txn: Arc<Transaction>) -> Self {
        Self {
            db,
            txn,
            params: Parameters::new(),
        }
    }

    /// Replaces the parameters of the context.
    pub fn with_parameters(mut self, params: Parameters) -> Self {
        self.params = params;
        self
    }

    pub fn database(&self) -> &'db Database {
        self.db
    }

    pub fn transaction(&self) -> &Arc<Transaction> {
        &self.txn
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.params
    }

    /// Looks up a parameter.
    pub fn parameter(&self, name: &str) -> Result<&Value> {
        self.params
            .get(name)
            .ok_or_else(|| Error::parameter_missing(name))
    }

    /// Looks up an integer parameter. `Int32` values are widened.
    pub fn parameter_i64(&self, name: &str) -> Result<i64> {
        let value = self.parameter(name)?;
        value.as_integer().ok_or_else(|| {
            Error::invalid_parameter(name, format!("expected an integer, got {:?}", value))
        })
    }

    /// Looks up a string parameter.
    pub fn parameter_str(&self, name: &str) -> Result<&str> {
        let value = self.parameter(name)?;
        value.as_str().ok_or_else(|| {
            Error::invalid_parameter(
                name,
                format!("expected a string, got {:?}", value),
            )
        })
    }

    /// Returns an executor running commands in this context.
    pub fn executor(&self) -> Executor<'_, 'db> {
        Executor::new(self)
    }
}

impl std::fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("txn", &self.txn.id())
            .field("params", &self.params)
            .finish()
    }
}
