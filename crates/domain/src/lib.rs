//! Shared configuration model and errors for the Diameter peer crates.

pub mod config;
pub mod error;

pub use error::{Error, Result};
