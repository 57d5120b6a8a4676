#![forbid(unsafe_code)]

//! Storage adapters for an LCP license server: a content index and a license
//! store over Postgres, SQLite or MySQL.

pub mod cli;
pub mod config;
pub mod db;
pub mod utils;

pub use db::{
    Content, ContentIndex, Database, DatabaseError, Dialect, License, LicenseStore, RecordStream,
    StoreManager,
};
