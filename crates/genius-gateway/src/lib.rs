//! HTTP gateway exposing the Genius supervisor.
//!
//! Routes are mounted by [`GatewayServer::build`]; every error is reported
//! as a JSON body `{"error", "kind"}` with a status derived from the error
//! class.

pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, GatewayServer};
