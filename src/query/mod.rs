//! Read path: the five analytics read contracts over the hot/cold stores
//! and the hourly rollup and performance-summary tables.

pub mod fleet;
pub mod history;
pub mod live;
pub mod performance;

pub use history::HistoryWindow;
