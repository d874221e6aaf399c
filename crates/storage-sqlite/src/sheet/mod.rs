//! SQLite-backed building sheet.

mod model;
mod repository;

pub use model::{SheetFieldDB, SheetRecordDB};
pub(crate) use repository::new_record_id;
pub use repository::SheetRepository;
