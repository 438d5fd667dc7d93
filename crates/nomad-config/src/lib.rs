pub mod loader;
pub mod model;

pub use loader::ConfigLoader;
pub use model::{
    AgentConfig, AppConfig, CacheConfig, GatewayConfig, HotelProfile, LlmConfig, RateLimitConfig,
    SessionConfig, SpeechConfig,
};
