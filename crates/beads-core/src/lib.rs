//! Core domain types for the beads system.
//!
//! Everything the engine persists or projects lives here: the [`issue::Issue`]
//! record, its relational satellites, query filters, hash-based ID generation,
//! and the canonical JSONL encoding.

pub mod comment;
pub mod dependency;
pub mod enums;
pub mod filter;
pub mod idgen;
pub mod issue;
pub mod jsonl;
pub mod validation;
