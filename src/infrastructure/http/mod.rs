//! HTTP surface: rule CRUD, execution history, manual triggers, webhooks.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;
pub mod state;
pub mod webhooks;

pub use error::ApiError;
pub use server::{build_router, serve};
pub use state::AppState;
