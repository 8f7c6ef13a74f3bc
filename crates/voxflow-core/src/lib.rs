//! Core types, config, errors, and dialogue session model for Voxflow.

pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod types;
