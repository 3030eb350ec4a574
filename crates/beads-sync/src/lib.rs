//! Durability & sync layer for the beads system.
//!
//! Owns everything between the store and git: the atomic publication
//! helper, the canonical JSONL projector (export/import), the deletion
//! manifest, the auto-flush manager, and the three-way merge driver. All of
//! it works against the [`beads_storage::Storage`] trait, never a concrete
//! backend.

pub mod atomic;
pub mod error;
pub mod export;
pub mod flush;
pub mod import;
pub mod manifest;
pub mod merge;

pub use atomic::publish;
pub use error::{Result, SyncError};
pub use export::{ExportOptions, ExportStats, export_to_path, export_to_writer};
pub use flush::{DEFAULT_DEBOUNCE, FlushManager, FlushRequest, FlushState};
pub use import::{ImportError, ImportReport, import_from_path};
pub use manifest::{DeletionManifest, DeletionRecord};
pub use merge::{MergeConflict, MergeOutcome, merge_files};
