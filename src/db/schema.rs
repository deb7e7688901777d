//! Fixture schemas for the stores the transfer reads and writes.
//!
//! Neither store is created by this crate. The DDL mirrors the columns of the
//! real stores closely enough to build test databases, and is shared with the
//! integration tests under `tests/fixtures`.

pub const CATALOG_SCHEMA: &str = include_str!("../../tests/fixtures/catalog.sql");
pub const LIBRARY_SCHEMA: &str = include_str!("../../tests/fixtures/library.sql");
pub const FACES_SCHEMA: &str = include_str!("../../tests/fixtures/faces.sql");
