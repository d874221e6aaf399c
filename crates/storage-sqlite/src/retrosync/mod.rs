//! SQLite persistence for the retrosync control record.

mod model;
mod repository;

pub use model::SyncControlDB;
pub use repository::SyncControlRepository;
