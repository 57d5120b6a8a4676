use std::sync::Arc;
use std::time::Duration;

use diesel::r2d2::{self, ConnectionManager};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::db::{
    ContentIndex, DatabaseError, Dialect, LicenseStore, SqlContentIndex, SqlLicenseStore,
};

#[cfg(feature = "mysql")]
use diesel::mysql::MysqlConnection;
#[cfg(feature = "postgres")]
use diesel::pg::PgConnection;
#[cfg(feature = "sqlite")]
use diesel::sqlite::SqliteConnection;

#[cfg(feature = "postgres")]
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;
#[cfg(feature = "sqlite")]
pub type SqlitePool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
#[cfg(feature = "mysql")]
pub type MysqlPool = r2d2::Pool<ConnectionManager<MysqlConnection>>;

/// Pooled handle to the license server database.
///
/// Cloning shares the pool. The stores never close it; dropping the last
/// clone does.
#[derive(Clone)]
pub enum Database {
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
    #[cfg(feature = "sqlite")]
    Sqlite(SqlitePool),
    #[cfg(feature = "mysql")]
    Mysql(MysqlPool),
}

impl Database {
    /// Builds a pool for the backend named by the configured url.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let url = config.connection_string();
        match config.dialect() {
            #[cfg(feature = "postgres")]
            Dialect::Postgres => {
                let pool = pool_builder(config).build(ConnectionManager::<PgConnection>::new(url))?;
                info!("connected to postgres");
                Ok(Database::Postgres(pool))
            }
            #[cfg(feature = "sqlite")]
            Dialect::Sqlite => {
                let path = config.sqlite_path().unwrap_or(url);
                let pool = pool_builder(config)
                    .connection_customizer(Box::new(SqlitePragmas))
                    .build(ConnectionManager::<SqliteConnection>::new(path.as_str()))?;
                info!(path = %path, "opened sqlite database");
                Ok(Database::Sqlite(pool))
            }
            #[cfg(feature = "mysql")]
            Dialect::Mysql => {
                let pool =
                    pool_builder(config).build(ConnectionManager::<MysqlConnection>::new(url))?;
                info!("connected to mysql");
                Ok(Database::Mysql(pool))
            }
            #[allow(unreachable_patterns)]
            other => Err(DatabaseError::Unsupported(format!(
                "{other} support is not compiled in"
            ))),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "postgres")]
            Database::Postgres(_) => "postgres",
            #[cfg(feature = "sqlite")]
            Database::Sqlite(_) => "sqlite",
            #[cfg(feature = "mysql")]
            Database::Mysql(_) => "mysql",
        }
    }

    /// Connections currently checked out and idle in the pool.
    pub fn pool_state(&self) -> (u32, u32) {
        let state = match self {
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => pool.state(),
            #[cfg(feature = "sqlite")]
            Database::Sqlite(pool) => pool.state(),
            #[cfg(feature = "mysql")]
            Database::Mysql(pool) => pool.state(),
        };
        (state.connections - state.idle_connections, state.idle_connections)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Database").field(&self.backend_name()).finish()
    }
}

fn pool_builder<M: r2d2::ManageConnection>(config: &DatabaseConfig) -> r2d2::Builder<M> {
    r2d2::Pool::builder()
        .max_size(config.max_connections())
        .min_idle(Some(config.min_connections()))
        .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
}

/// Turns on foreign key enforcement, which SQLite leaves off per connection.
#[cfg(feature = "sqlite")]
#[derive(Debug)]
struct SqlitePragmas;

#[cfg(feature = "sqlite")]
impl r2d2::CustomizeConnection<SqliteConnection, r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        use diesel::connection::SimpleConnection;
        conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(r2d2::Error::QueryError)
    }
}

/// Opens both stores over one database.
#[derive(Clone)]
pub struct StoreManager {
    database: Database,
    dialect: Dialect,
    content_index: Arc<dyn ContentIndex>,
    license_store: Arc<dyn LicenseStore>,
}

impl StoreManager {
    /// The content table is bootstrapped first so the license foreign key has
    /// a target.
    pub async fn open(database: Database, dialect: Dialect) -> Result<Self, DatabaseError> {
        let content_index = Arc::new(SqlContentIndex::open(database.clone(), dialect).await?);
        let license_store = Arc::new(SqlLicenseStore::open(database.clone(), dialect).await?);
        info!(%dialect, backend = database.backend_name(), "license server stores ready");

        Ok(Self {
            database,
            dialect,
            content_index,
            license_store,
        })
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let database = Database::connect(config)?;
        Self::open(database, config.dialect()).await
    }

    pub fn content_index(&self) -> Arc<dyn ContentIndex> {
        self.content_index.clone()
    }

    pub fn license_store(&self) -> Arc<dyn LicenseStore> {
        self.license_store.clone()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }
}
