//! Core runtime infrastructure.
//!
//! This module contains the essential components for running Tessera:
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Node runtime orchestration
//! - [`time`] - Sleep abstraction and retry intervals
//! - [`error`] - Error types and their retry classification

pub mod config;
pub mod error;
pub mod runtime;
pub mod time;
