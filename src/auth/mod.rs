//! Caller identity and file access rules.
//!
//! Identity tokens are verified by the web layer; this module only models
//! the resulting caller and decides what it may do with a file.

pub mod permission;
mod role;

pub use permission::{
    can_delete_file, can_download_file, can_update_file, check_permission, filter_file_update,
    require_admin, PermissionError,
};
pub use role::{CurrentUser, Role};
