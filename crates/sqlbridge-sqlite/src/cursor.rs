//! Row-by-row access to a statement's results.

use crate::statement::{Statement, StepResult};
use sqlbridge_core::{Result, Row, Value, ValueType};
use std::sync::Arc;

/// Result reader over a borrowed [`Statement`].
///
/// Once the statement reports completion the cursor stays done: further
/// steps return [`StepResult::Done`] without running the statement again.
/// As an iterator it yields fully copied [`Row`]s.
#[derive(Debug)]
pub struct Cursor<'a> {
    stmt: &'a mut Statement,
    columns: Option<Arc<[String]>>,
    done: bool,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(stmt: &'a mut Statement) -> Self {
        Self {
            stmt,
            columns: None,
            done: false,
        }
    }

    pub fn step(&mut self) -> Result<StepResult> {
        if self.done {
            return Ok(StepResult::Done);
        }
        match self.stmt.step() {
            Ok(StepResult::Done) => {
                self.done = true;
                Ok(StepResult::Done)
            }
            Ok(StepResult::Row) => Ok(StepResult::Row),
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn column_count(&self) -> Result<usize> {
        self.stmt.column_count()
    }

    pub fn column_name(&self, index: usize) -> Result<String> {
        self.stmt.column_name(index)
    }

    pub fn column_type(&self, index: usize) -> Result<ValueType> {
        self.stmt.column_type(index)
    }

    pub fn column_long(&self, index: usize) -> Result<i64> {
        self.stmt.column_long(index)
    }

    pub fn column_double(&self, index: usize) -> Result<f64> {
        self.stmt.column_double(index)
    }

    pub fn column_string(&self, index: usize) -> Result<Option<String>> {
        self.stmt.column_string(index)
    }

    pub fn column_blob(&self, index: usize) -> Result<Vec<u8>> {
        self.stmt.column_blob(index)
    }

    pub fn column_value(&self, index: usize) -> Result<Value> {
        self.stmt.column_value(index)
    }

    fn columns(&mut self) -> Result<Arc<[String]>> {
        if let Some(columns) = &self.columns {
            return Ok(Arc::clone(columns));
        }
        let columns: Arc<[String]> = self.stmt.column_names()?.into();
        self.columns = Some(Arc::clone(&columns));
        Ok(columns)
    }

    /// Copy the row the cursor is positioned on.
    pub fn row(&mut self) -> Result<Row> {
        let columns = self.columns()?;
        self.stmt.read_row(&columns)
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Ok(StepResult::Row) => Some(self.row()),
            Ok(StepResult::Done) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
