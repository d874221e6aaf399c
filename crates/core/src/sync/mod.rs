//! Sheet <-> building database sync: models, reconciler and record pushes.

mod batch_applier;
mod cell_value;
mod change_classifier;
mod field_mapper;
mod key_index;
mod record_push_model;
mod record_push_service;
mod retrosync_model;
mod retrosync_scheduler;
mod retrosync_service;
mod sync_traits;
mod watermark;

pub use batch_applier::*;
pub use cell_value::*;
pub use change_classifier::*;
pub use field_mapper::*;
pub use key_index::*;
pub use record_push_model::*;
pub use record_push_service::*;
pub use retrosync_model::*;
pub use retrosync_scheduler::*;
pub use retrosync_service::*;
pub use sync_traits::*;
pub use watermark::*;
