mod field_type;
mod fragments;
mod query;
mod schema;
mod selection;

pub use field_type::*;
pub use fragments::*;
pub use query::*;
pub use schema::*;
pub use selection::*;
