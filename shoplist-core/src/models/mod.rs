mod history;
mod shopping_item;

pub use history::{ArchiveStatus, HistoryEntry, HistoryItem, HistoryProduct, HistoryRecord};
pub use shopping_item::{NewItem, ShoppingItem, DEFAULT_UNIT};
