/// Background jobs owned by the feed engine
pub mod refresh;

pub use refresh::{RefreshHandle, RefreshJob, DEFAULT_REFRESH_INTERVAL};
