#[cfg(not(any(feature = "postgres", feature = "sqlite", feature = "mysql")))]
compile_error!("enable at least one of the `postgres`, `sqlite` or `mysql` features");

/// Checks a connection out of `$db` and runs `$body` with `$conn` bound to
/// the backend's concrete connection type.
///
/// The body is expanded once per compiled backend, so diesel sees a concrete
/// connection in every arm. `?` inside the body converts into
/// [`DatabaseError`].
macro_rules! with_conn {
    ($db:expr, |$conn:ident| $body:expr) => {{
        match $db {
            #[cfg(feature = "postgres")]
            $crate::db::Database::Postgres(pool) => {
                let mut pooled = pool.get()?;
                let $conn: &mut ::diesel::pg::PgConnection = &mut pooled;
                $body
            }
            #[cfg(feature = "sqlite")]
            $crate::db::Database::Sqlite(pool) => {
                let mut pooled = pool.get()?;
                let $conn: &mut ::diesel::sqlite::SqliteConnection = &mut pooled;
                $body
            }
            #[cfg(feature = "mysql")]
            $crate::db::Database::Mysql(pool) => {
                let mut pooled = pool.get()?;
                let $conn: &mut ::diesel::mysql::MysqlConnection = &mut pooled;
                $body
            }
        }
    }};
}

pub use self::content::SqlContentIndex;
pub use self::cursor::RecordStream;
pub use self::dialect::Dialect;
pub use self::error::DatabaseError;
pub use self::license::SqlLicenseStore;
pub use self::manager::{Database, StoreManager};
pub use self::models::{Content, License, UserInfo, UserRights, DEFAULT_CONTENT_TYPE};
pub use self::stores::{ContentIndex, LicenseStore};

pub mod content;
pub mod cursor;
pub mod dialect;
pub mod error;
pub mod license;
pub mod manager;
pub mod models;
pub mod stores;

/// Runs a blocking database operation off the async executor.
pub(crate) async fn run_blocking<T, F>(operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(operation).await?
}
