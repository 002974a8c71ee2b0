pub mod generation;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod stats;
pub mod workers;
pub mod ws;

pub use routes::create_router;
