//! Deterministic, pure logic shared by the exploration engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod event;
pub mod schedule;
pub mod scoring;
pub mod summary;
pub mod types;
