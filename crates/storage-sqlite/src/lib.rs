//! SQLite storage for the sheet sync service.
//!
//! Provides the local sheet (`SheetStoreTrait`) and the retrosync control
//! record (`WatermarkStoreTrait`) on top of diesel with a pooled reader and a
//! single serialized writer.

pub mod db;
pub mod errors;
pub mod retrosync;
pub mod schema;
pub mod sheet;

pub use db::{create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle};
pub use errors::StorageError;
pub use retrosync::SyncControlRepository;
pub use sheet::SheetRepository;
