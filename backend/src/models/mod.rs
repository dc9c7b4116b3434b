//! Domain types shared by the codec, predicate builder and join engine.

pub mod coords;
pub mod object;
pub mod query;

pub use coords::*;
pub use object::*;
pub use query::*;
