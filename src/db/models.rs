use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretSlice};
use serde::Serialize;

pub const DEFAULT_CONTENT_TYPE: &str = "application/epub+zip";

/// An encrypted publication known to the license server.
#[derive(Debug, Serialize)]
pub struct Content {
    pub id: String,
    #[serde(skip)]
    pub encryption_key: SecretSlice<u8>,
    pub location: String,
    pub length: i64,
    pub sha256: String,
    #[serde(rename = "type")]
    pub media_type: String,
}

impl Content {
    pub fn new(id: impl Into<String>, encryption_key: Vec<u8>, location: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            encryption_key: encryption_key.into(),
            location: location.into(),
            length: 0,
            sha256: String::new(),
            media_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    /// Media type to persist; an empty value falls back to EPUB.
    pub fn media_type_or_default(&self) -> &str {
        if self.media_type.is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            &self.media_type
        }
    }
}

impl Clone for Content {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            encryption_key: self.encryption_key.expose_secret().to_vec().into(),
            location: self.location.clone(),
            length: self.length,
            sha256: self.sha256.clone(),
            media_type: self.media_type.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserRights {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

/// A license issued against a [`Content`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct License {
    pub id: String,
    pub user: UserInfo,
    pub provider: String,
    pub issued: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    pub rights: UserRights,
    pub content_id: String,
    // lsd_status, owned by the status document service
    #[serde(skip)]
    pub status: i32,
}
