//! Access rules for catalog files.
//!
//! The checks are pure: callers look up the caller's permission row (if any)
//! and pass it in, so the rules can be tested without a database.

use thiserror::Error;

use crate::auth::role::{CurrentUser, Role};
use crate::file::{FileRecord, FileUpdate, PermissionRole};
use crate::DepotError;

/// Permission-related errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    /// User does not have sufficient role.
    #[error("this operation requires the {0} role or higher")]
    InsufficientRole(Role),

    /// User is not authenticated.
    #[error("this operation requires login")]
    NotAuthenticated,

    /// File is deleted or archived.
    #[error("file is not accessible")]
    FileInactive,

    /// No permission row grants access to the file.
    #[error("missing permission for this file")]
    NoFileAccess,

    /// Only the owner or an admin may do this.
    #[error("only the owner or an admin may {0}")]
    OwnerOrAdminOnly(&'static str),

    /// Every requested field was filtered out.
    #[error("no modifiable fields")]
    NothingToUpdate,
}

impl From<PermissionError> for DepotError {
    fn from(e: PermissionError) -> Self {
        match e {
            PermissionError::NotAuthenticated => DepotError::Auth(e.to_string()),
            PermissionError::NothingToUpdate => DepotError::Validation(e.to_string()),
            _ => DepotError::Permission(e.to_string()),
        }
    }
}

/// Check that a caller is present and has at least `required`.
///
/// # Examples
///
/// ```
/// use filedepot::auth::{check_permission, PermissionError, Role};
///
/// assert!(matches!(
///     check_permission(None, Role::User),
///     Err(PermissionError::NotAuthenticated)
/// ));
/// ```
pub fn check_permission(
    user: Option<&CurrentUser>,
    required: Role,
) -> Result<&CurrentUser, PermissionError> {
    let user = user.ok_or(PermissionError::NotAuthenticated)?;
    if !user.role.can_access(required) {
        return Err(PermissionError::InsufficientRole(required));
    }
    Ok(user)
}

/// Require an admin or moderator.
pub fn require_admin(user: Option<&CurrentUser>) -> Result<&CurrentUser, PermissionError> {
    check_permission(user, Role::Admin)
}

fn is_owner(user: &CurrentUser, file: &FileRecord, grant: Option<PermissionRole>) -> bool {
    file.created_by == user.id || grant == Some(PermissionRole::Owner)
}

/// Whether `user` may obtain the bytes of `file`.
///
/// The file must be active for everyone. Elevated roles skip the per-file
/// check; others need to be the uploader or hold any permission row.
pub fn can_download_file(
    user: &CurrentUser,
    file: &FileRecord,
    grant: Option<PermissionRole>,
) -> Result<(), PermissionError> {
    if !file.is_active() {
        return Err(PermissionError::FileInactive);
    }
    if user.is_elevated() || file.created_by == user.id || grant.is_some() {
        return Ok(());
    }
    Err(PermissionError::NoFileAccess)
}

/// Whether `user` may edit the metadata of `file`.
pub fn can_update_file(
    user: &CurrentUser,
    file: &FileRecord,
    grant: Option<PermissionRole>,
) -> Result<(), PermissionError> {
    if user.is_elevated()
        || file.created_by == user.id
        || grant.is_some_and(|role| role.can_edit())
    {
        return Ok(());
    }
    Err(PermissionError::NoFileAccess)
}

/// Whether `user` may soft-delete `file`.
pub fn can_delete_file(
    user: &CurrentUser,
    file: &FileRecord,
    grant: Option<PermissionRole>,
) -> Result<(), PermissionError> {
    if user.is_elevated() || is_owner(user, file, grant) {
        return Ok(());
    }
    Err(PermissionError::OwnerOrAdminOnly("delete this file"))
}

/// Reduce a requested metadata change to the fields `user` may set.
///
/// Blank names are dropped. A status change survives only for the owner or
/// an admin; editors get the remaining fields.
pub fn filter_file_update(
    user: &CurrentUser,
    file: &FileRecord,
    grant: Option<PermissionRole>,
    patch: FileUpdate,
) -> Result<FileUpdate, PermissionError> {
    can_update_file(user, file, grant)?;

    let may_change_status = user.is_elevated() || is_owner(user, file, grant);
    let filtered = FileUpdate {
        name: patch
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        description: patch.description,
        tags: patch.tags,
        status: patch.status.filter(|_| may_change_status),
    };

    if filtered.is_empty() {
        return Err(PermissionError::NothingToUpdate);
    }
    Ok(filtered)
}
