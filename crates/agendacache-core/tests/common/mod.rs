//! Scripted in-memory backend shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agendacache_core::api::{ApiError, Backend, Query, Table};
use agendacache_core::auth::{SessionContext, SessionData};
use agendacache_core::cache::CacheManager;
use agendacache_core::connectivity::Connectivity;
use agendacache_core::sync::SyncContext;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

/// How every following request should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Server,
    Unauthorized,
    Forbidden,
}

impl Failure {
    fn error(self) -> ApiError {
        match self {
            Failure::Server => ApiError::ServerError("scripted outage".to_string()),
            Failure::Unauthorized => ApiError::Unauthorized,
            Failure::Forbidden => ApiError::AccessDenied(
                "new row violates row-level security policy".to_string(),
            ),
        }
    }
}

#[derive(Default)]
pub struct FakeBackend {
    tables: Mutex<HashMap<Table, Vec<Value>>>,
    calls: Mutex<Vec<String>>,
    failure: Mutex<Option<Failure>>,
    table_failures: Mutex<HashMap<Table, Failure>>,
    uploads: Mutex<Vec<String>>,
    next_id: AtomicUsize,
    pub account: Mutex<Option<SessionData>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, table: Table, rows: Vec<Value>) {
        self.tables
            .lock()
            .unwrap()
            .entry(table)
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, table: Table) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn fail_with(&self, failure: Option<Failure>) {
        *self.failure.lock().unwrap() = failure;
    }

    /// Fail every request touching `table` while other tables keep working.
    pub fn fail_table(&self, table: Table, failure: Failure) {
        self.table_failures.lock().unwrap().insert(table, failure);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn write_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("select") && !c.starts_with("health"))
            .collect()
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(call);
        match *self.failure.lock().unwrap() {
            Some(failure) => Err(failure.error()),
            None => Ok(()),
        }
    }

    fn record_table(&self, verb: &str, table: Table) -> Result<(), ApiError> {
        self.record(format!("{} {}", verb, table))?;
        match self.table_failures.lock().unwrap().get(&table) {
            Some(failure) => Err(failure.error()),
            None => Ok(()),
        }
    }

    /// Columns that must be unique together, mirroring the database.
    fn unique_columns(table: Table) -> Vec<&'static str> {
        match table {
            Table::Reaction => vec!["profile_id", "author_id", "kind"],
            other => other.conflict_columns().split(',').collect(),
        }
    }

    fn same_key(table: Table, a: &Value, b: &Value) -> bool {
        Self::unique_columns(table)
            .iter()
            .all(|col| a.get(*col).is_some() && a.get(*col) == b.get(*col))
    }

    fn complete_row(&self, mut row: Value) -> Value {
        if let Some(obj) = row.as_object_mut() {
            if !obj.contains_key("id") {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                obj.insert("id".to_string(), json!(format!("gen-{}", n)));
            }
            obj.entry("created_at")
                .or_insert_with(|| json!(Utc::now()));
        }
        row
    }

    fn as_rows(rows: Value) -> Vec<Value> {
        match rows {
            Value::Array(items) => items,
            single => vec![single],
        }
    }
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn sort_key(row: &Value, column: &str) -> Option<String> {
    match row.get(column) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(format!("{:020}", n.as_i64().unwrap_or_default())),
        Some(other) => Some(other.to_string()),
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, ApiError> {
        self.record_table("select", table)?;
        let mut rows: Vec<Value> = self
            .rows(table)
            .into_iter()
            .filter(|row| query.matches(row))
            .collect();
        if let Some(order) = query.ordering() {
            rows.sort_by(|a, b| {
                let (ka, kb) = (sort_key(a, &order.column), sort_key(b, &order.column));
                match (ka, kb) {
                    (Some(x), Some(y)) if order.ascending => x.cmp(&y),
                    (Some(x), Some(y)) => y.cmp(&x),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                }
            });
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, rows: Value) -> Result<Vec<Value>, ApiError> {
        self.record_table("insert", table)?;
        let mut tables = self.tables.lock().unwrap();
        let existing = tables.entry(table).or_default();
        let mut stored = Vec::new();
        for row in Self::as_rows(rows) {
            let row = self.complete_row(row);
            if existing.iter().any(|r| Self::same_key(table, r, &row)) {
                return Err(ApiError::Conflict(format!("duplicate key in {}", table)));
            }
            existing.push(row.clone());
            stored.push(row);
        }
        Ok(stored)
    }

    async fn update(
        &self,
        table: Table,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, ApiError> {
        self.record_table("update", table)?;
        let mut tables = self.tables.lock().unwrap();
        let mut updated = Vec::new();
        for row in tables.entry(table).or_default().iter_mut() {
            if query.matches(row) {
                merge(row, &patch);
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: Table, query: &Query) -> Result<(), ApiError> {
        self.record_table("delete", table)?;
        self.tables
            .lock()
            .unwrap()
            .entry(table)
            .or_default()
            .retain(|row| !query.matches(row));
        Ok(())
    }

    async fn upsert(&self, table: Table, rows: Value) -> Result<Vec<Value>, ApiError> {
        self.record_table("upsert", table)?;
        let mut tables = self.tables.lock().unwrap();
        let existing = tables.entry(table).or_default();
        let mut stored = Vec::new();
        for row in Self::as_rows(rows) {
            match existing.iter_mut().find(|r| Self::same_key(table, r, &row)) {
                Some(current) => {
                    merge(current, &row);
                    stored.push(current.clone());
                }
                None => {
                    existing.push(row.clone());
                    stored.push(row);
                }
            }
        }
        Ok(stored)
    }

    async fn rpc(&self, function: &str, _args: Value) -> Result<Value, ApiError> {
        self.record(format!("rpc {}", function))?;
        Ok(Value::Null)
    }

    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), ApiError> {
        self.record(format!("upload {}", bucket))?;
        self.uploads.lock().unwrap().push(format!("{}/{}", bucket, path));
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("https://fake.local/storage/v1/object/public/{}/{}", bucket, path)
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<SessionData, ApiError> {
        self.record("sign_in".to_string())?;
        self.account
            .lock()
            .unwrap()
            .clone()
            .ok_or(ApiError::Unauthorized)
    }

    async fn sign_up(
        &self,
        _email: &str,
        _password: &str,
        _username: &str,
    ) -> Result<Option<SessionData>, ApiError> {
        self.record("sign_up".to_string())?;
        Ok(self.account.lock().unwrap().clone())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<SessionData, ApiError> {
        self.record("refresh".to_string())?;
        let account = self.account.lock().unwrap().clone();
        match account {
            Some(data) if data.refresh_token == refresh_token => Ok(SessionData {
                access_token: "refreshed-token".to_string(),
                expires_at: Utc::now() + Duration::hours(1),
                ..data
            }),
            _ => Err(ApiError::Unauthorized),
        }
    }

    async fn sign_out(&self) -> Result<(), ApiError> {
        self.record("sign_out".to_string())
    }

    async fn health(&self) -> Result<(), ApiError> {
        self.record("health".to_string())
    }
}

pub const ME: &str = "user-1";
pub const FRIEND: &str = "user-2";

pub fn session_for(user_id: &str) -> SessionData {
    SessionData {
        access_token: format!("token-{}", user_id),
        refresh_token: format!("refresh-{}", user_id),
        user_id: user_id.to_string(),
        email: format!("{}@example.com", user_id),
        expires_at: Utc::now() + Duration::hours(1),
    }
}

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub cache: Arc<CacheManager>,
    pub session: SessionContext,
    pub connectivity: Connectivity,
}

impl Harness {
    /// Signed in as `ME`, online, with an empty in-memory cache.
    pub fn new() -> Self {
        Self {
            backend: FakeBackend::new(),
            cache: Arc::new(CacheManager::in_memory()),
            session: SessionContext::signed_in(session_for(ME)),
            connectivity: Connectivity::online(),
        }
    }

    pub fn ctx(&self) -> SyncContext {
        SyncContext::new(
            Arc::clone(&self.cache),
            self.backend.clone(),
            self.session.clone(),
            self.connectivity.clone(),
        )
    }
}

pub fn agenda_row(id: &str, name: &str, owner: &str, join_key: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "description": null,
        "owner_id": owner,
        "join_key": join_key,
        "created_at": "2026-01-01T00:00:00Z",
    })
}

pub fn element_row(id: &str, agenda_id: &str, section_id: &str, deadline: Option<&str>) -> Value {
    json!({
        "id": id,
        "agenda_id": agenda_id,
        "section_id": section_id,
        "title": format!("Task {}", id),
        "description": null,
        "deadline": deadline,
        "created_by": ME,
        "created_at": "2026-01-01T00:00:00Z",
    })
}

pub fn profile_row(id: &str, username: &str) -> Value {
    json!({ "id": id, "username": username, "avatar_url": null, "bio": null })
}

/// One agenda `a1` owned by `ME` with a section and three elements, `e2`
/// marked urgent and `e3` completed by `ME`.
pub fn seed_agenda(backend: &FakeBackend) {
    backend.seed(Table::Agenda, vec![agenda_row("a1", "Trip", ME, "KEY12345")]);
    backend.seed(
        Table::AgendaSection,
        vec![json!({ "id": "s1", "agenda_id": "a1", "name": "Todo", "position": 0 })],
    );
    backend.seed(
        Table::AgendaElement,
        vec![
            element_row("e1", "a1", "s1", Some("2026-03-01T00:00:00Z")),
            element_row("e2", "a1", "s1", Some("2026-05-01T00:00:00Z")),
            element_row("e3", "a1", "s1", None),
        ],
    );
    backend.seed(
        Table::AgendaMember,
        vec![json!({ "agenda_id": "a1", "user_id": ME })],
    );
    backend.seed(
        Table::AgendaEditor,
        vec![json!({ "agenda_id": "a1", "user_id": ME })],
    );
    backend.seed(
        Table::UrgentElement,
        vec![json!({ "user_id": ME, "element_id": "e2" })],
    );
    backend.seed(
        Table::CompletedElement,
        vec![json!({ "user_id": ME, "element_id": "e3" })],
    );
    backend.seed(
        Table::Profile,
        vec![profile_row(ME, "me"), profile_row(FRIEND, "friend")],
    );
    backend.seed(
        Table::UserCredit,
        vec![json!({ "user_id": ME, "amount": 42 })],
    );
}
