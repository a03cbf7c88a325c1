//! Look-ahead preloading.

mod fetcher;
mod scheduler;
mod status;
mod window;

pub use fetcher::{HttpRangeFetcher, RangeFetcher, RangeResponse};
pub use scheduler::PreloadScheduler;
pub use status::{PreloadPriority, PreloadStatus};
pub use window::preload_window;
