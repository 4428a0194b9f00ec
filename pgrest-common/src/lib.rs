//! pgrest Common Types and Utilities
//!
//! Shared types, configuration, and error handling for the pgrest REST layer.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod types;

pub use config::PgRestConfig;
pub use error::{Error, Result};
