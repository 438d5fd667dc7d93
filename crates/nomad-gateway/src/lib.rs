pub mod api;
pub mod metrics;
pub mod router;
pub mod server;
pub mod state;

pub use router::build_router;
pub use server::GatewayServer;
pub use state::{AppState, SharedState};
