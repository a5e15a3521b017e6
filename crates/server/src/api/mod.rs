pub mod account;
pub mod error;
pub mod estimate;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
