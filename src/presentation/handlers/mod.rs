mod health;
mod query;

pub use health::{HealthResponse, health_handler};
pub use query::{ErrorResponse, NO_QUERY_PROVIDED, QueryResponse, SourceNode, query_handler};
