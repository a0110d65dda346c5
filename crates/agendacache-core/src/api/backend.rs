//! The remote backend as seen by the rest of the crate.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::query::{Query, Table};
use super::ApiError;
use crate::auth::SessionData;

/// Table-level access plus auth, storage and remote procedures.
///
/// Rows travel as JSON objects; use the typed helpers in this module to
/// convert them.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, ApiError>;

    /// Insert one row or an array of rows, returning what was stored.
    async fn insert(&self, table: Table, rows: Value) -> Result<Vec<Value>, ApiError>;

    async fn update(&self, table: Table, query: &Query, patch: Value)
        -> Result<Vec<Value>, ApiError>;

    async fn delete(&self, table: Table, query: &Query) -> Result<(), ApiError>;

    /// Insert or merge on the table's conflict columns.
    async fn upsert(&self, table: Table, rows: Value) -> Result<Vec<Value>, ApiError>;

    async fn rpc(&self, function: &str, args: Value) -> Result<Value, ApiError>;

    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ApiError>;

    fn public_url(&self, bucket: &str, path: &str) -> String;

    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionData, ApiError>;

    /// `None` when the account must be confirmed before a session exists.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<Option<SessionData>, ApiError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<SessionData, ApiError>;

    async fn sign_out(&self) -> Result<(), ApiError>;

    /// Cheap reachability probe.
    async fn health(&self) -> Result<(), ApiError>;
}

fn decode<T: DeserializeOwned>(table: Table, row: Value) -> Result<T, ApiError> {
    serde_json::from_value(row)
        .map_err(|e| ApiError::InvalidResponse(format!("Unexpected {} row: {}", table, e)))
}

fn encode<T: Serialize + ?Sized>(table: Table, value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value)
        .map_err(|e| ApiError::InvalidResponse(format!("Cannot encode {} row: {}", table, e)))
}

/// Select and decode rows. An `in` filter with no values short-circuits to
/// an empty result without a request.
pub async fn fetch<T: DeserializeOwned>(
    backend: &dyn Backend,
    table: Table,
    query: Query,
) -> Result<Vec<T>, ApiError> {
    if query.is_empty_match() {
        return Ok(Vec::new());
    }
    backend
        .select(table, &query)
        .await?
        .into_iter()
        .map(|row| decode(table, row))
        .collect()
}

pub async fn fetch_one<T: DeserializeOwned>(
    backend: &dyn Backend,
    table: Table,
    query: Query,
) -> Result<Option<T>, ApiError> {
    Ok(fetch(backend, table, query).await?.into_iter().next())
}

/// Insert one row and decode the stored representation.
pub async fn insert_one<T, R>(backend: &dyn Backend, table: Table, row: &T) -> Result<R, ApiError>
where
    T: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let stored = backend.insert(table, encode(table, row)?).await?;
    match stored.into_iter().next() {
        Some(row) => decode(table, row),
        None => Err(ApiError::InvalidResponse(format!(
            "Insert into {} returned no rows",
            table
        ))),
    }
}

pub async fn upsert_one<T: Serialize + ?Sized>(
    backend: &dyn Backend,
    table: Table,
    row: &T,
) -> Result<(), ApiError> {
    backend.upsert(table, encode(table, row)?).await?;
    Ok(())
}
