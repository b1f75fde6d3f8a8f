// Database module
pub mod postgres;

pub use postgres::PostgresStrategyStore;
