//! Public HTTP API

pub mod http;
pub mod models;

pub use http::{create_router, AppState};
