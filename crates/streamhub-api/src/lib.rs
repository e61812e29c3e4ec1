pub mod account;
pub mod auth;
pub mod channels;
pub mod envelope;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod tokens;
pub mod uploads;

pub use auth::{AppState, AppStateInner};
pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use tokens::{TokenService, parse_duration};
