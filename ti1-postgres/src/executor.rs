use crate::convert::{bind_arg, row_cells};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode, PgTypeInfo};
use sqlx::{Column, Either, Executor, Statement};
use ti1_core::{Arg, DatabaseConfig, PoolConfig, QueryExecutor, Result, RowSet, Ti1Error};
use tracing::{debug, info};

/// [`QueryExecutor`] over a bounded PostgreSQL connection pool.
pub struct PostgresExecutor {
    pool: PgPool,
}

impl PostgresExecutor {
    /// Open the pool and wait for the first connection, so a bad host or bad
    /// credentials fail here instead of on the first request.
    pub async fn connect(database: &DatabaseConfig, pool: &PoolConfig) -> Result<Self> {
        let options = connect_options(database)?;
        info!(
            host = %database.host,
            port = %database.port,
            dbname = %database.dbname,
            "connecting to PostgreSQL"
        );
        let pool = PgPoolOptions::new()
            .max_connections(pool.max_connections)
            .max_lifetime(pool.max_lifetime())
            .idle_timeout(pool.idle_timeout())
            .connect_with(options)
            .await
            .map_err(|e| Ti1Error::Connection(e.to_string()))?;
        info!("connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        info!("disconnecting from PostgreSQL");
        self.pool.close().await;
        info!("disconnected from PostgreSQL");
    }
}

fn connect_options(database: &DatabaseConfig) -> Result<PgConnectOptions> {
    let port: u16 = database
        .port
        .parse()
        .map_err(|_| Ti1Error::Config(format!("invalid database port: {}", database.port)))?;
    let ssl_mode: PgSslMode = database
        .sslmode
        .parse()
        .map_err(|_| Ti1Error::Config(format!("invalid sslmode: {}", database.sslmode)))?;
    Ok(PgConnectOptions::new()
        .host(&database.host)
        .port(port)
        .username(&database.user)
        .password(&database.password)
        .database(&database.dbname)
        .ssl_mode(ssl_mode))
}

fn query_error(e: sqlx::Error) -> Ti1Error {
    Ti1Error::Query(e.to_string())
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    async fn run(&self, sql: &str, args: &[Arg]) -> Result<RowSet> {
        debug!(sql, args = args.len(), "running query");
        let mut conn = self.pool.acquire().await.map_err(query_error)?;

        // Prepare first so every argument can be bound as the type the server
        // inferred for its placeholder.
        let statement = (&mut *conn).prepare(sql).await.map_err(query_error)?;
        let param_types: Vec<PgTypeInfo> = match statement.parameters() {
            Some(Either::Left(types)) => types.to_vec(),
            _ => Vec::new(),
        };
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let mut query = statement.query();
        for (idx, arg) in args.iter().enumerate() {
            query = bind_arg(query, arg, param_types.get(idx))?;
        }
        let rows = query.fetch_all(&mut *conn).await.map_err(query_error)?;

        let mut set = RowSet::new(columns);
        for row in &rows {
            set.push_row(row_cells(row)?);
        }
        debug!(rows = set.rows.len(), "query finished");
        Ok(set)
    }
}
