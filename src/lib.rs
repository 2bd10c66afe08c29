//! filedepot - file upload and download service
//!
//! Accepts single, multiple and chunked uploads, merges chunk sessions into
//! catalogued files and hands out single-use download links.

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod download;
pub mod error;
pub mod file;
pub mod logging;
pub mod web;

pub use auth::{CurrentUser, PermissionError, Role};
pub use config::Config;
pub use db::Database;
pub use error::{DepotError, Result};
