pub mod auth;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod server;
pub mod state;

pub use auth::TokenAuthority;
pub use errors::{ApiError, ApiResult};
pub use metrics::ApiMetrics;
pub use server::{build_router, serve};
pub use state::AppState;
