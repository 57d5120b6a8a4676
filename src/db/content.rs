use std::sync::Arc;

use async_trait::async_trait;
use diesel::connection::DefaultLoadingMode;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Binary, Nullable, Text};
use secrecy::ExposeSecret;
use tracing::debug;

use super::cursor::{RecordStream, spawn_cursor};
use super::models::{Content, DEFAULT_CONTENT_TYPE};
use super::{ContentIndex, Database, DatabaseError, Dialect, run_blocking};

/// SQL text for the `content` table, rendered once per dialect.
#[derive(Debug)]
pub(crate) struct ContentStatements {
    pub(crate) create_table: String,
    pub(crate) add_type_column: Option<String>,
    pub(crate) get: String,
    pub(crate) add: String,
    pub(crate) update: String,
    pub(crate) list: String,
}

impl ContentStatements {
    pub(crate) fn new(dialect: Dialect) -> Self {
        let ty = dialect.quote_ident("type");
        let key_type = match dialect {
            Dialect::Postgres => "bytea",
            Dialect::Sqlite | Dialect::Mysql => "varbinary(64)",
        };
        let columns = format!("id, encryption_key, location, length, sha256, {ty} AS media_type");

        Self {
            create_table: format!(
                "CREATE TABLE IF NOT EXISTS content (\
                 id varchar(255) PRIMARY KEY, \
                 encryption_key {key_type} NOT NULL, \
                 location text NOT NULL, \
                 length bigint, \
                 sha256 varchar(64), \
                 {ty} varchar(255) NOT NULL DEFAULT '{DEFAULT_CONTENT_TYPE}')"
            ),
            // databases created before the media type existed
            add_type_column: (dialect == Dialect::Sqlite).then(|| {
                format!(
                    "ALTER TABLE content ADD COLUMN {ty} varchar(255) NOT NULL DEFAULT '{DEFAULT_CONTENT_TYPE}'"
                )
            }),
            get: dialect.render(&format!("SELECT {columns} FROM content WHERE id = ? LIMIT 1")),
            add: dialect.render(&format!(
                "INSERT INTO content (id, encryption_key, location, length, sha256, {ty}) \
                 VALUES (?, ?, ?, ?, ?, ?)"
            )),
            update: dialect.render(&format!(
                "UPDATE content SET encryption_key = ?, location = ?, length = ?, sha256 = ?, {ty} = ? \
                 WHERE id = ?"
            )),
            list: format!("SELECT {columns} FROM content"),
        }
    }
}

#[derive(QueryableByName)]
struct ContentRow {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Binary)]
    encryption_key: Vec<u8>,
    #[diesel(sql_type = Text)]
    location: String,
    #[diesel(sql_type = Nullable<BigInt>)]
    length: Option<i64>,
    #[diesel(sql_type = Nullable<Text>)]
    sha256: Option<String>,
    #[diesel(sql_type = Text)]
    media_type: String,
}

impl From<ContentRow> for Content {
    fn from(row: ContentRow) -> Self {
        Self {
            id: row.id,
            encryption_key: row.encryption_key.into(),
            location: row.location,
            length: row.length.unwrap_or_default(),
            sha256: row.sha256.unwrap_or_default(),
            media_type: row.media_type,
        }
    }
}

/// [`ContentIndex`] over the `content` table.
#[derive(Clone)]
pub struct SqlContentIndex {
    db: Database,
    statements: Arc<ContentStatements>,
}

impl SqlContentIndex {
    /// Creates the `content` table if needed and renders the statements for
    /// `dialect`.
    pub async fn open(db: Database, dialect: Dialect) -> Result<Self, DatabaseError> {
        let statements = Arc::new(ContentStatements::new(dialect));

        let bootstrap_db = db.clone();
        let bootstrap = statements.clone();
        run_blocking(move || {
            with_conn!(&bootstrap_db, |conn| {
                diesel::sql_query(bootstrap.create_table.as_str()).execute(conn)?;
                if let Some(alter) = &bootstrap.add_type_column {
                    if let Err(e) = diesel::sql_query(alter.as_str()).execute(conn) {
                        debug!("content type column not added: {e}");
                    }
                }
                Ok(())
            })
        })
        .await?;

        debug!(%dialect, "content index opened");
        Ok(Self { db, statements })
    }
}

#[async_trait]
impl ContentIndex for SqlContentIndex {
    async fn get(&self, id: &str) -> Result<Content, DatabaseError> {
        let db = self.db.clone();
        let statements = self.statements.clone();
        let id = id.to_string();
        run_blocking(move || {
            let row = with_conn!(&db, |conn| {
                diesel::sql_query(statements.get.as_str())
                    .bind::<Text, _>(&id)
                    .get_result::<ContentRow>(conn)
                    .optional()?
            });
            row.map(Content::from).ok_or(DatabaseError::ContentNotFound)
        })
        .await
    }

    async fn add(&self, content: &Content) -> Result<(), DatabaseError> {
        let db = self.db.clone();
        let statements = self.statements.clone();
        let content = content.clone();
        run_blocking(move || {
            with_conn!(&db, |conn| {
                diesel::sql_query(statements.add.as_str())
                    .bind::<Text, _>(&content.id)
                    .bind::<Binary, _>(content.encryption_key.expose_secret())
                    .bind::<Text, _>(&content.location)
                    .bind::<BigInt, _>(content.length)
                    .bind::<Text, _>(&content.sha256)
                    .bind::<Text, _>(content.media_type_or_default())
                    .execute(conn)?;
            });
            Ok(())
        })
        .await
    }

    async fn update(&self, content: &Content) -> Result<(), DatabaseError> {
        let db = self.db.clone();
        let statements = self.statements.clone();
        let content = content.clone();
        run_blocking(move || {
            with_conn!(&db, |conn| {
                diesel::sql_query(statements.update.as_str())
                    .bind::<Binary, _>(content.encryption_key.expose_secret())
                    .bind::<Text, _>(&content.location)
                    .bind::<BigInt, _>(content.length)
                    .bind::<Text, _>(&content.sha256)
                    .bind::<Text, _>(content.media_type_or_default())
                    .bind::<Text, _>(&content.id)
                    .execute(conn)?;
            });
            Ok(())
        })
        .await
    }

    async fn list(&self) -> RecordStream<Content> {
        let db = self.db.clone();
        let statements = self.statements.clone();
        spawn_cursor(move |sink| {
            with_conn!(&db, |conn| {
                let rows = diesel::sql_query(statements.list.as_str())
                    .load_iter::<ContentRow, DefaultLoadingMode>(conn)?;
                for row in rows {
                    if !sink.push(row.map(Content::from).map_err(DatabaseError::from)) {
                        debug!("content cursor abandoned");
                        break;
                    }
                }
            });
            Ok(())
        })
    }
}
