//! PostgreSQL connectivity and catalog introspection.

pub mod connection;
pub mod introspect;

pub use connection::PgConnection;
pub use introspect::introspect_schema;
