//! Task Master hosted backend adapter
//!
//! Connects the session manager and the task store to a Supabase project:
//! the auth endpoints back [`AuthService`](taskmaster_auth::AuthService) and
//! the REST endpoint backs [`TableStore`](taskmaster_tasks::TableStore).
//! One [`SupabaseClient`] serves both, so data requests always carry the
//! token of the current session.

pub mod api;
pub mod auth;
pub mod client;
pub mod error;
pub mod rest;

pub use client::SupabaseClient;
pub use error::{CloudError, CloudResult};
