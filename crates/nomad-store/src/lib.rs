pub mod response_cache;
pub mod session_store;

pub use response_cache::{CacheStats, ResponseCache};
pub use session_store::SessionStore;
