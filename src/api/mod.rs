pub mod handlers;
pub mod logging;
pub mod routes;

pub use handlers::*;
pub use routes::*;
