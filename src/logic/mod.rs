pub mod lookup;
pub mod shape;

pub use lookup::*;
pub use shape::*;
