//! crates/training_portal_core/src/rbac.rs
//!
//! Pure predicates answering "can role R do X". A missing role never grants anything.

use crate::domain::{Permission, Role};
use crate::permissions::PermissionCatalog;

pub fn has_permission(catalog: &PermissionCatalog, role: Option<Role>, permission: Permission) -> bool {
    role.is_some_and(|r| catalog.permissions_for_role(r).contains(&permission))
}

/// True if at least one permission is granted. Stops at the first match.
pub fn has_any<I>(catalog: &PermissionCatalog, role: Option<Role>, permissions: I) -> bool
where
    I: IntoIterator<Item = Permission>,
{
    permissions
        .into_iter()
        .any(|p| has_permission(catalog, role, p))
}

/// True if every permission is granted. Without a role this is always false.
pub fn has_all<I>(catalog: &PermissionCatalog, role: Option<Role>, permissions: I) -> bool
where
    I: IntoIterator<Item = Permission>,
{
    role.is_some()
        && permissions
            .into_iter()
            .all(|p| has_permission(catalog, role, p))
}

pub fn is_staff(role: Option<Role>) -> bool {
    matches!(role, Some(r) if r != Role::Trainee)
}

pub fn is_admin(catalog: &PermissionCatalog, role: Option<Role>) -> bool {
    has_permission(catalog, role, Permission::AdminAccess)
}

pub fn is_super_admin(role: Option<Role>) -> bool {
    role == Some(Role::SuperAdmin)
}

pub fn can_issue_passcodes(catalog: &PermissionCatalog, role: Option<Role>) -> bool {
    has_permission(catalog, role, Permission::IssuePasscodes)
}
