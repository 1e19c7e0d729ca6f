//! Archived trips: browsing, deduplicated products, re-adding to the active
//! list and product removal.

mod dedup;
mod selection;
mod view;

pub use dedup::dedup_products;
pub use selection::Selection;
pub use view::{CascadePlan, CascadeReport, HistoryView};
