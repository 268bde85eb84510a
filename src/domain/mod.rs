pub mod error;
pub mod schema;
pub mod table;

pub use schema::{Boundary, SchemaContract, SchemaMismatch};
pub use table::{Row, Table, Value};
