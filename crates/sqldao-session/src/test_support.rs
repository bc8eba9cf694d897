//! A scripted `Database` for unit tests: records every call and replays
//! queued results.

use std::collections::VecDeque;

use parking_lot::Mutex;
use sqldao_core::{BoundParameter, Database, DatabaseId, Dialect, Error, Result, RowSet, Value};
use sqldao_query::Ansi;

pub(crate) struct ScriptedDb {
    id: DatabaseId,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    tables: Mutex<VecDeque<RowSet>>,
    sets: Mutex<VecDeque<Vec<RowSet>>>,
    failures: Mutex<VecDeque<String>>,
}

impl ScriptedDb {
    pub(crate) fn new() -> Self {
        Self {
            id: DatabaseId::next(),
            calls: Mutex::new(Vec::new()),
            tables: Mutex::new(VecDeque::new()),
            sets: Mutex::new(VecDeque::new()),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue the result of the next `get_data_table`.
    pub(crate) fn push_table(&self, rows: RowSet) {
        self.tables.lock().push_back(rows);
    }

    /// Queue the result of the next `get_data_set`.
    pub(crate) fn push_set(&self, sets: Vec<RowSet>) {
        self.sets.lock().push_back(sets);
    }

    /// Queue a batch returning one generated key.
    pub(crate) fn push_key(&self, id: i64) {
        self.push_set(vec![RowSet::scalar("ID", Value::BigInt(id))]);
    }

    /// Fail the next call with `message`.
    pub(crate) fn fail_next(&self, message: &str) {
        self.failures.lock().push_back(message.to_string());
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub(crate) fn params(&self, call: usize) -> Vec<Value> {
        self.calls
            .lock()
            .get(call)
            .map(|(_, params)| params.clone())
            .unwrap_or_default()
    }

    fn record(&self, sql: &str, params: &[BoundParameter]) -> Result<()> {
        self.calls.lock().push((
            sql.to_string(),
            params.iter().map(|p| p.value.clone()).collect(),
        ));
        match self.failures.lock().pop_front() {
            Some(message) => Err(Error::execution(sql, message)),
            None => Ok(()),
        }
    }
}

impl Database for ScriptedDb {
    fn id(&self) -> DatabaseId {
        self.id
    }

    fn dialect(&self) -> &dyn Dialect {
        &Ansi
    }

    fn get_data_table(&self, sql: &str, params: &[BoundParameter]) -> Result<RowSet> {
        self.record(sql, params)?;
        Ok(self.tables.lock().pop_front().unwrap_or_default())
    }

    fn execute_sql(&self, sql: &str, params: &[BoundParameter]) -> Result<u64> {
        self.record(sql, params)?;
        Ok(1)
    }

    fn get_data_set(&self, sql: &str, params: &[BoundParameter]) -> Result<Vec<RowSet>> {
        self.record(sql, params)?;
        Ok(self.sets.lock().pop_front().unwrap_or_default())
    }
}
