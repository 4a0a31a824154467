//! HTTP API module: health, market reads and writes, local oracle actions, balances, metrics.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
