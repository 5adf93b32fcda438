mod convert;
mod executor;

pub use executor::PostgresExecutor;
