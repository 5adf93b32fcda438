pub mod config;
pub mod error;
pub mod query;
pub mod record;
pub mod testing;

pub use config::{Config, DatabaseConfig, PoolConfig, ServerConfig, DEFAULT_CONFIG_PATH};
pub use error::{Result, Ti1Error};
pub use query::{resolve_limit, Arg, LimitPolicy, QueryBuilder};
pub use record::{float_number, project, CellValue, OrderedRecord, RawCell, RowSet};

/// The executable-query interface: run one statement with its bound arguments.
///
/// Implementations report statement failures as [`Ti1Error::Query`] and cells
/// they cannot decode as [`Ti1Error::Scan`].
#[async_trait::async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn run(&self, sql: &str, args: &[Arg]) -> Result<RowSet>;
}
