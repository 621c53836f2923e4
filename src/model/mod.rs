pub mod filing;
pub mod parcel;
pub mod soql;
pub mod trace;

pub use filing::*;
pub use parcel::*;
pub use soql::*;
pub use trace::*;
