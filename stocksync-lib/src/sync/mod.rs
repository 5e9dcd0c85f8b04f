//! Inventory synchronisation on top of the dispatcher: planning detail
//! requests, comparing their answers with the sheet, and running both as
//! one streamed session.
mod delta;
mod plan;
mod session;

pub use delta::{
    needs_update, transform, FailedTask, GoodUpdated, GoodUpdatedSku, SkuMismatch, SyncRecord,
};
pub use plan::{plan, SkuContext};
pub use session::SyncSession;
