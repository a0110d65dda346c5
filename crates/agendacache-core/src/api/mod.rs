//! Backend access.
//!
//! `Backend` is the collaborator every screen and action talks to;
//! `RestClient` implements it against the hosted REST service. Filters are
//! built with `Query`, and failures are classified by `ApiError::kind`.

pub mod backend;
pub mod client;
pub mod error;
pub mod query;

pub use backend::{fetch, fetch_one, insert_one, upsert_one, Backend};
pub use client::RestClient;
pub use error::{ApiError, ErrorKind};
pub use query::{Filter, Query, Table};
