pub mod benchmark;
pub mod memory;
pub mod postgres;
pub mod schema;

pub use benchmark::aggregate_from_latest;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use schema::DatabaseSchema;
