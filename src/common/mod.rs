//! Common types shared across kiwi

pub mod config;
pub mod error;

pub use config::{Config, NodeRole};
pub use error::{Error, Result};
