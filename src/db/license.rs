use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use diesel::connection::DefaultLoadingMode;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Nullable, Text, Timestamp};
use tracing::debug;

use super::cursor::{RecordStream, RowSink, spawn_cursor};
use super::models::{License, UserInfo, UserRights};
use super::{Database, DatabaseError, Dialect, LicenseStore, run_blocking};

const LICENSE_COLUMNS: &str = "id, user_id, provider, issued, updated, \
     rights_print, rights_copy, rights_start, rights_end, content_fk, lsd_status";

const TABLE_DEF: &str = "CREATE TABLE IF NOT EXISTS license (\
     id varchar(255) PRIMARY KEY, \
     user_id varchar(255) NOT NULL, \
     provider varchar(255) NOT NULL, \
     issued datetime(6) NOT NULL, \
     updated datetime(6) DEFAULT NULL, \
     rights_print int(11) DEFAULT NULL, \
     rights_copy int(11) DEFAULT NULL, \
     rights_start datetime(6) DEFAULT NULL, \
     rights_end datetime(6) DEFAULT NULL, \
     content_fk varchar(255) NOT NULL, \
     lsd_status integer DEFAULT 0, \
     FOREIGN KEY(content_fk) REFERENCES content(id))";

const TABLE_DEF_POSTGRES: &str = "CREATE TABLE IF NOT EXISTS license (\
     id VARCHAR(255) PRIMARY KEY, \
     user_id VARCHAR(255) NOT NULL, \
     provider VARCHAR(255) NOT NULL, \
     issued TIMESTAMPTZ NOT NULL, \
     updated TIMESTAMPTZ DEFAULT NULL, \
     rights_print INT DEFAULT NULL, \
     rights_copy INT DEFAULT NULL, \
     rights_start TIMESTAMPTZ DEFAULT NULL, \
     rights_end TIMESTAMPTZ DEFAULT NULL, \
     content_fk VARCHAR(255) NOT NULL, \
     lsd_status INT DEFAULT 0, \
     FOREIGN KEY(content_fk) REFERENCES content(id))";

#[derive(Debug)]
pub(crate) struct LicenseStatements {
    pub(crate) create_table: &'static str,
    pub(crate) get: String,
    pub(crate) add: String,
    pub(crate) update: String,
    pub(crate) update_rights: String,
    pub(crate) update_lsd_status: String,
    pub(crate) list: String,
    pub(crate) list_all: String,
}

impl LicenseStatements {
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self {
            create_table: match dialect {
                Dialect::Postgres => TABLE_DEF_POSTGRES,
                Dialect::Sqlite | Dialect::Mysql => TABLE_DEF,
            },
            get: dialect.render(&format!("SELECT {LICENSE_COLUMNS} FROM license WHERE id = ?")),
            add: dialect.render(
                "INSERT INTO license (id, user_id, provider, issued, updated, \
                 rights_print, rights_copy, rights_start, rights_end, content_fk) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ),
            update: dialect.render(
                "UPDATE license SET user_id = ?, provider = ?, updated = ?, \
                 rights_print = ?, rights_copy = ?, rights_start = ?, rights_end = ?, content_fk = ? \
                 WHERE id = ?",
            ),
            update_rights: dialect.render(
                "UPDATE license SET rights_print = ?, rights_copy = ?, rights_start = ?, rights_end = ?, \
                 updated = ? WHERE id = ?",
            ),
            update_lsd_status: dialect.render("UPDATE license SET lsd_status = ? WHERE id = ?"),
            list: dialect.render(&format!(
                "SELECT {LICENSE_COLUMNS} FROM license WHERE content_fk = ? LIMIT ? OFFSET ?"
            )),
            list_all: dialect.render(&format!(
                "SELECT {LICENSE_COLUMNS} FROM license ORDER BY issued DESC LIMIT ? OFFSET ?"
            )),
        }
    }
}

/// Page size and zero-based page index to LIMIT and OFFSET. The offset
/// saturates at `i64::MAX`.
fn limit_offset(page: u32, page_num: u32) -> (i64, i64) {
    let limit = i64::from(page);
    (limit, limit.saturating_mul(i64::from(page_num)))
}

/// Current time at the whole-second precision stored in `updated`.
fn now_truncated() -> NaiveDateTime {
    Utc::now().trunc_subsecs(0).naive_utc()
}

fn naive(at: Option<DateTime<Utc>>) -> Option<NaiveDateTime> {
    at.map(|at| at.naive_utc())
}

#[derive(QueryableByName)]
struct LicenseRow {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Text)]
    user_id: String,
    #[diesel(sql_type = Text)]
    provider: String,
    #[diesel(sql_type = Timestamp)]
    issued: NaiveDateTime,
    #[diesel(sql_type = Nullable<Timestamp>)]
    updated: Option<NaiveDateTime>,
    #[diesel(sql_type = Nullable<Integer>)]
    rights_print: Option<i32>,
    #[diesel(sql_type = Nullable<Integer>)]
    rights_copy: Option<i32>,
    #[diesel(sql_type = Nullable<Timestamp>)]
    rights_start: Option<NaiveDateTime>,
    #[diesel(sql_type = Nullable<Timestamp>)]
    rights_end: Option<NaiveDateTime>,
    #[diesel(sql_type = Text)]
    content_fk: String,
    #[diesel(sql_type = Nullable<Integer>)]
    lsd_status: Option<i32>,
}

impl From<LicenseRow> for License {
    fn from(row: LicenseRow) -> Self {
        Self {
            id: row.id,
            user: UserInfo { id: row.user_id },
            provider: row.provider,
            issued: row.issued.and_utc(),
            updated: row.updated.map(|at| at.and_utc()),
            rights: UserRights {
                print: row.rights_print,
                copy: row.rights_copy,
                start: row.rights_start.map(|at| at.and_utc()),
                end: row.rights_end.map(|at| at.and_utc()),
            },
            content_id: row.content_fk,
            status: row.lsd_status.unwrap_or_default(),
        }
    }
}

/// [`LicenseStore`] over the `license` table.
#[derive(Clone)]
pub struct SqlLicenseStore {
    db: Database,
    statements: Arc<LicenseStatements>,
}

impl SqlLicenseStore {
    /// Creates the `license` table if needed. The `content` table must
    /// already exist for the foreign key.
    pub async fn open(db: Database, dialect: Dialect) -> Result<Self, DatabaseError> {
        let statements = Arc::new(LicenseStatements::new(dialect));

        let bootstrap_db = db.clone();
        let create_table = statements.create_table;
        run_blocking(move || {
            with_conn!(&bootstrap_db, |conn| {
                diesel::sql_query(create_table).execute(conn)?;
            });
            Ok(())
        })
        .await?;

        debug!(%dialect, "license store opened");
        Ok(Self { db, statements })
    }

    fn stream(&self, content_id: Option<String>, page: u32, page_num: u32) -> RecordStream<License> {
        let db = self.db.clone();
        let statements = self.statements.clone();
        let (limit, offset) = limit_offset(page, page_num);
        spawn_cursor(move |sink| {
            with_conn!(&db, |conn| match content_id {
                Some(content_id) => forward(
                    diesel::sql_query(statements.list.as_str())
                        .bind::<Text, _>(content_id)
                        .bind::<BigInt, _>(limit)
                        .bind::<BigInt, _>(offset)
                        .load_iter::<LicenseRow, DefaultLoadingMode>(conn)?,
                    sink,
                ),
                None => forward(
                    diesel::sql_query(statements.list_all.as_str())
                        .bind::<BigInt, _>(limit)
                        .bind::<BigInt, _>(offset)
                        .load_iter::<LicenseRow, DefaultLoadingMode>(conn)?,
                    sink,
                ),
            });
            Ok(())
        })
    }
}

fn forward<I>(rows: I, sink: &RowSink<License>)
where
    I: Iterator<Item = QueryResult<LicenseRow>>,
{
    for row in rows {
        if !sink.push(row.map(License::from).map_err(DatabaseError::from)) {
            debug!("license cursor abandoned");
            break;
        }
    }
}

#[async_trait]
impl LicenseStore for SqlLicenseStore {
    async fn get(&self, id: &str) -> Result<License, DatabaseError> {
        let db = self.db.clone();
        let statements = self.statements.clone();
        let id = id.to_string();
        run_blocking(move || {
            let row = with_conn!(&db, |conn| {
                diesel::sql_query(statements.get.as_str())
                    .bind::<Text, _>(&id)
                    .get_result::<LicenseRow>(conn)
                    .optional()?
            });
            row.map(License::from).ok_or(DatabaseError::LicenseNotFound)
        })
        .await
    }

    async fn add(&self, license: &License) -> Result<(), DatabaseError> {
        let db = self.db.clone();
        let statements = self.statements.clone();
        let license = license.clone();
        run_blocking(move || {
            with_conn!(&db, |conn| {
                diesel::sql_query(statements.add.as_str())
                    .bind::<Text, _>(&license.id)
                    .bind::<Text, _>(&license.user.id)
                    .bind::<Text, _>(&license.provider)
                    .bind::<Timestamp, _>(license.issued.naive_utc())
                    .bind::<Nullable<Timestamp>, _>(None::<NaiveDateTime>)
                    .bind::<Nullable<Integer>, _>(license.rights.print)
                    .bind::<Nullable<Integer>, _>(license.rights.copy)
                    .bind::<Nullable<Timestamp>, _>(naive(license.rights.start))
                    .bind::<Nullable<Timestamp>, _>(naive(license.rights.end))
                    .bind::<Text, _>(&license.content_id)
                    .execute(conn)?;
            });
            Ok(())
        })
        .await
    }

    async fn update(&self, license: &License) -> Result<(), DatabaseError> {
        let db = self.db.clone();
        let statements = self.statements.clone();
        let license = license.clone();
        run_blocking(move || {
            with_conn!(&db, |conn| {
                diesel::sql_query(statements.update.as_str())
                    .bind::<Text, _>(&license.user.id)
                    .bind::<Text, _>(&license.provider)
                    .bind::<Timestamp, _>(now_truncated())
                    .bind::<Nullable<Integer>, _>(license.rights.print)
                    .bind::<Nullable<Integer>, _>(license.rights.copy)
                    .bind::<Nullable<Timestamp>, _>(naive(license.rights.start))
                    .bind::<Nullable<Timestamp>, _>(naive(license.rights.end))
                    .bind::<Text, _>(&license.content_id)
                    .bind::<Text, _>(&license.id)
                    .execute(conn)?;
            });
            Ok(())
        })
        .await
    }

    async fn update_rights(&self, license: &License) -> Result<(), DatabaseError> {
        let db = self.db.clone();
        let statements = self.statements.clone();
        let license = license.clone();
        run_blocking(move || {
            let affected = with_conn!(&db, |conn| {
                diesel::sql_query(statements.update_rights.as_str())
                    .bind::<Nullable<Integer>, _>(license.rights.print)
                    .bind::<Nullable<Integer>, _>(license.rights.copy)
                    .bind::<Nullable<Timestamp>, _>(naive(license.rights.start))
                    .bind::<Nullable<Timestamp>, _>(naive(license.rights.end))
                    .bind::<Timestamp, _>(now_truncated())
                    .bind::<Text, _>(&license.id)
                    .execute(conn)?
            });
            if affected == 0 {
                return Err(DatabaseError::LicenseNotFound);
            }
            Ok(())
        })
        .await
    }

    async fn update_lsd_status(&self, id: &str, status: i32) -> Result<(), DatabaseError> {
        let db = self.db.clone();
        let statements = self.statements.clone();
        let id = id.to_string();
        run_blocking(move || {
            with_conn!(&db, |conn| {
                diesel::sql_query(statements.update_lsd_status.as_str())
                    .bind::<Integer, _>(status)
                    .bind::<Text, _>(&id)
                    .execute(conn)?;
            });
            Ok(())
        })
        .await
    }

    async fn list(&self, content_id: &str, page: u32, page_num: u32) -> RecordStream<License> {
        self.stream(Some(content_id.to_string()), page, page_num)
    }

    async fn list_all(&self, page: u32, page_num: u32) -> RecordStream<License> {
        self.stream(None, page, page_num)
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use chrono::{Duration, TimeZone};
    use futures::StreamExt;
    use tempfile::NamedTempFile;
    use test_case::test_case;

    use super::*;
    use crate::db::manager::tests::sqlite_config;
    use crate::db::{Content, ContentIndex, SqlContentIndex};

    struct Fixture {
        _file: NamedTempFile,
        _content: SqlContentIndex,
        store: SqlLicenseStore,
    }

    async fn fixture() -> Fixture {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let db = Database::connect(&sqlite_config(&file)).expect("sqlite pool");
        let content = SqlContentIndex::open(db.clone(), Dialect::Sqlite)
            .await
            .expect("open content index");
        let store = SqlLicenseStore::open(db, Dialect::Sqlite)
            .await
            .expect("open license store");
        for id in ["book-a", "book-b"] {
            content
                .add(&Content::new(id, vec![9; 32], format!("/srv/{id}.epub")))
                .await
                .expect("add content");
        }
        Fixture {
            _file: file,
            _content: content,
            store,
        }
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
    }

    fn license(id: &str, content_id: &str, issued: DateTime<Utc>) -> License {
        License {
            id: id.to_string(),
            user: UserInfo {
                id: format!("user-of-{id}"),
            },
            provider: "https://provider.example".to_string(),
            issued,
            updated: None,
            rights: UserRights {
                print: Some(20),
                copy: Some(2000),
                start: Some(issued),
                end: Some(issued + Duration::days(30)),
            },
            content_id: content_id.to_string(),
            status: 0,
        }
    }

    async fn collect(stream: RecordStream<License>) -> Vec<License> {
        stream.map(|row| row.expect("license row")).collect().await
    }

    #[test_case(Dialect::Postgres, "UPDATE license SET lsd_status = $1 WHERE id = $2")]
    #[test_case(Dialect::Sqlite, "UPDATE license SET lsd_status = ? WHERE id = ?")]
    #[test_case(Dialect::Mysql, "UPDATE license SET lsd_status = ? WHERE id = ?")]
    fn status_statement_per_dialect(dialect: Dialect, expected: &str) {
        assert_eq!(LicenseStatements::new(dialect).update_lsd_status, expected);
    }

    #[test]
    fn postgres_statements_number_every_parameter() {
        let statements = LicenseStatements::new(Dialect::Postgres);
        assert!(statements.add.ends_with("VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"));
        assert!(statements.update.ends_with("WHERE id = $9"));
        assert!(statements.update_rights.ends_with("updated = $5 WHERE id = $6"));
        assert!(statements.list.ends_with("WHERE content_fk = $1 LIMIT $2 OFFSET $3"));
        assert!(statements.list_all.ends_with("ORDER BY issued DESC LIMIT $1 OFFSET $2"));
        assert!(statements.create_table.contains("TIMESTAMPTZ"));
        assert!(!statements.get.contains('?'));
    }

    #[test_case(Dialect::Sqlite)]
    #[test_case(Dialect::Mysql)]
    fn datetime_columns_keep_microseconds(dialect: Dialect) {
        let table = LicenseStatements::new(dialect).create_table;
        for column in ["issued", "updated", "rights_start", "rights_end"] {
            assert!(table.contains(&format!("{column} datetime(6)")), "{column}: {table}");
        }
    }

    #[tokio::test]
    async fn sub_second_timestamps_round_trip() {
        let fx = fixture().await;
        let issued = base_time() + Duration::microseconds(123_456);
        let original = license("lic-1", "book-a", issued);
        fx.store.add(&original).await.expect("add");

        let fetched = fx.store.get("lic-1").await.expect("get");
        assert_eq!(fetched.issued, issued);
        assert_eq!(fetched.rights, original.rights);
    }

    #[test_case(10, 0 => (10, 0))]
    #[test_case(10, 1 => (10, 10))]
    #[test_case(25, 3 => (25, 75))]
    #[test_case(0, 7 => (0, 0))]
    #[test_case(u32::MAX, 1 => (4_294_967_295, 4_294_967_295))]
    #[test_case(u32::MAX, u32::MAX => (4_294_967_295, i64::MAX))]
    fn page_size_times_page_index(page: u32, page_num: u32) -> (i64, i64) {
        limit_offset(page, page_num)
    }

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let fx = fixture().await;
        let original = license("lic-1", "book-a", base_time());
        fx.store.add(&original).await.expect("add");

        let fetched = fx.store.get("lic-1").await.expect("get");
        assert_eq!(fetched, original);
        assert!(fetched.updated.is_none());
        assert_eq!(fetched.status, 0);
    }

    #[tokio::test]
    async fn null_rights_round_trip() {
        let fx = fixture().await;
        let mut original = license("lic-1", "book-a", base_time());
        original.rights = UserRights::default();
        fx.store.add(&original).await.expect("add");

        assert_eq!(fx.store.get("lic-1").await.expect("get").rights, UserRights::default());
    }

    #[tokio::test]
    async fn missing_license_is_not_found() {
        let fx = fixture().await;
        let err = fx.store.get("nope").await.expect_err("missing license");
        assert!(matches!(err, DatabaseError::LicenseNotFound));
    }

    #[tokio::test]
    async fn unknown_content_violates_foreign_key() {
        let fx = fixture().await;
        let err = fx
            .store
            .add(&license("lic-1", "no-such-book", base_time()))
            .await
            .expect_err("dangling content reference");
        assert!(matches!(err, DatabaseError::Query(_)), "{err:?}");
    }

    #[tokio::test]
    async fn update_rewrites_fields_and_stamps_updated() {
        let fx = fixture().await;
        let original = license("lic-1", "book-a", base_time());
        fx.store.add(&original).await.expect("add");

        let mut changed = original.clone();
        changed.user.id = "someone-else".to_string();
        changed.provider = "https://other.example".to_string();
        changed.rights.print = None;
        changed.content_id = "book-b".to_string();
        let before = Utc::now().trunc_subsecs(0);
        fx.store.update(&changed).await.expect("update");

        let fetched = fx.store.get("lic-1").await.expect("get");
        assert_eq!(fetched.user.id, "someone-else");
        assert_eq!(fetched.provider, "https://other.example");
        assert_eq!(fetched.rights.print, None);
        assert_eq!(fetched.content_id, "book-b");
        assert_eq!(fetched.issued, original.issued);
        let updated = fetched.updated.expect("updated stamped");
        assert!(updated >= before);
        assert_eq!(updated, updated.trunc_subsecs(0));
    }

    #[tokio::test]
    async fn update_rights_touches_only_rights() {
        let fx = fixture().await;
        let original = license("lic-1", "book-a", base_time());
        fx.store.add(&original).await.expect("add");

        let mut changed = original.clone();
        changed.provider = "ignored".to_string();
        changed.rights = UserRights {
            print: Some(0),
            copy: None,
            start: None,
            end: Some(base_time() + Duration::days(1)),
        };
        fx.store.update_rights(&changed).await.expect("update rights");

        let fetched = fx.store.get("lic-1").await.expect("get");
        assert_eq!(fetched.rights, changed.rights);
        assert_eq!(fetched.provider, original.provider);
        assert!(fetched.updated.is_some());
    }

    // update_rights checks the affected row count, update and
    // update_lsd_status do not.
    #[tokio::test]
    async fn missing_row_checks_differ_between_updates() {
        let fx = fixture().await;
        let ghost = license("ghost", "book-a", base_time());

        let err = fx.store.update_rights(&ghost).await.expect_err("no row");
        assert!(matches!(err, DatabaseError::LicenseNotFound));

        fx.store.update(&ghost).await.expect("update reports success");
        fx.store
            .update_lsd_status("ghost", 3)
            .await
            .expect("status update reports success");
        assert!(fx.store.get("ghost").await.expect_err("nothing inserted").is_not_found());
    }

    #[tokio::test]
    async fn status_is_updated_independently() {
        let fx = fixture().await;
        let original = license("lic-1", "book-a", base_time());
        fx.store.add(&original).await.expect("add");

        fx.store.update_lsd_status("lic-1", 2).await.expect("status");
        let fetched = fx.store.get("lic-1").await.expect("get");
        assert_eq!(fetched.status, 2);
        assert!(fetched.updated.is_none());
        assert_eq!(fetched.rights, original.rights);
    }

    #[tokio::test]
    async fn list_all_pages_newest_first() {
        let fx = fixture().await;
        for n in 0..25 {
            let issued = base_time() + Duration::minutes(n);
            fx.store
                .add(&license(&format!("lic-{n:02}"), "book-a", issued))
                .await
                .expect("add");
        }

        let first = collect(fx.store.list_all(10, 0).await).await;
        let ids: Vec<_> = first.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "lic-24", "lic-23", "lic-22", "lic-21", "lic-20", "lic-19", "lic-18", "lic-17",
                "lic-16", "lic-15"
            ]
        );

        let second = collect(fx.store.list_all(10, 1).await).await;
        assert_eq!(second.len(), 10);
        assert_eq!(second[0].id, "lic-14");
        assert_eq!(second[9].id, "lic-05");

        let last = collect(fx.store.list_all(10, 2).await).await;
        assert_eq!(last.len(), 5);
        assert_eq!(last[4].id, "lic-00");

        assert!(collect(fx.store.list_all(10, 3).await).await.is_empty());
    }

    #[tokio::test]
    async fn list_filters_by_content() {
        let fx = fixture().await;
        for n in 0..6 {
            let content_id = if n % 2 == 0 { "book-a" } else { "book-b" };
            fx.store
                .add(&license(&format!("lic-{n}"), content_id, base_time()))
                .await
                .expect("add");
        }

        let mut ids: Vec<_> = collect(fx.store.list("book-b", 10, 0).await)
            .await
            .into_iter()
            .map(|l| {
                assert_eq!(l.content_id, "book-b");
                l.id
            })
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["lic-1", "lic-3", "lic-5"]);

        assert_eq!(collect(fx.store.list("book-a", 2, 1).await).await.len(), 1);
        assert!(collect(fx.store.list("book-c", 10, 0).await).await.is_empty());
    }

    #[tokio::test]
    async fn exhausted_list_stays_exhausted() {
        let fx = fixture().await;
        fx.store
            .add(&license("lic-1", "book-a", base_time()))
            .await
            .expect("add");

        let mut stream = fx.store.list_all(10, 0).await;
        assert_eq!(stream.next().await.expect("row").expect("license").id, "lic-1");
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }
}
