use async_trait::async_trait;

use super::DatabaseError;
use super::cursor::RecordStream;
use super::models::{Content, License};

/// Content id to encryption metadata.
#[async_trait]
pub trait ContentIndex: Send + Sync {
    /// Fails with [`DatabaseError::ContentNotFound`] when no row matches.
    async fn get(&self, id: &str) -> Result<Content, DatabaseError>;
    async fn add(&self, content: &Content) -> Result<(), DatabaseError>;
    /// Overwrites every mutable column. Succeeds even if `content.id` does
    /// not exist.
    async fn update(&self, content: &Content) -> Result<(), DatabaseError>;
    async fn list(&self) -> RecordStream<Content>;
}

/// License id to rights and usage metadata.
#[async_trait]
pub trait LicenseStore: Send + Sync {
    /// Fails with [`DatabaseError::LicenseNotFound`] when no row matches.
    async fn get(&self, id: &str) -> Result<License, DatabaseError>;
    /// Inserts the license with a NULL `updated` column.
    async fn add(&self, license: &License) -> Result<(), DatabaseError>;
    /// Rewrites user, provider, rights and content reference and stamps
    /// `updated`. No affected-row check.
    async fn update(&self, license: &License) -> Result<(), DatabaseError>;
    /// Rewrites the rights and stamps `updated`. Fails with
    /// [`DatabaseError::LicenseNotFound`] when no row was touched.
    async fn update_rights(&self, license: &License) -> Result<(), DatabaseError>;
    /// No affected-row check.
    async fn update_lsd_status(&self, id: &str, status: i32) -> Result<(), DatabaseError>;
    /// Licenses for one content, `page` rows starting at `page * page_num`.
    async fn list(&self, content_id: &str, page: u32, page_num: u32) -> RecordStream<License>;
    /// All licenses, most recently issued first, paged like [`list`](Self::list).
    async fn list_all(&self, page: u32, page_num: u32) -> RecordStream<License>;
}
