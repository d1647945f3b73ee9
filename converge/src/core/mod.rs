//! Deterministic logic shared by guard evaluation.
//!
//! Core modules are free of I/O side effects. They operate on in-memory
//! resources and values and return deterministic outputs suitable for tests.

pub mod block;
pub mod error;
pub mod inherit;
pub mod interpreter;
pub mod translate;
pub mod types;
