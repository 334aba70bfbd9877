// HTTP surface of the jService API: routing, handlers, error envelope.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::ApiServer;
