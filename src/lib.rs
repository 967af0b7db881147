#![doc = "The `novelism` library crate."]
#![doc = ""]
#![doc = "Accounts, books, chapters and chapter content behind a token-authenticated"]
#![doc = "HTTP API. The binary (`main.rs`) wires configuration, the Postgres pool and"]
#![doc = "the mailer into `state::AppState` and serves `routes::config` under `/api`."]

pub mod auth;
pub mod config;
pub mod error;
pub mod filters;
pub mod mailer;
pub mod models;
pub mod routes;
pub mod sequencer;
pub mod state;
pub mod store;

pub use crate::error::AppError;
pub use crate::state::AppState;
