//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `roomcast` application.
//!
//! This module centralizes the relay's error type, logging setup, and the
//! bounded retry/backoff helpers used around store and bus operations.

pub mod backoff;
pub mod error;
pub mod logging;
