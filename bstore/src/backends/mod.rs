//! Durable store backends.

pub mod sqlite;
