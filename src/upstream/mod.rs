pub mod geoclient;
pub mod socrata;
pub mod traits;

pub use geoclient::*;
pub use socrata::*;
pub use traits::*;
