//! crates/training_portal_core/src/permissions.rs
//!
//! The permission catalog: every known permission and the permission set of
//! each role. Built once at startup and shared read-only.

use std::collections::{BTreeSet, HashMap};

use crate::domain::{Permission, Role};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Role {0} has no permissions")]
    EmptyRole(Role),
    #[error("Role {0} is missing from the catalog")]
    MissingRole(Role),
    #[error("Role {role} references permission {permission} which is not in the catalog")]
    Dangling { role: Role, permission: Permission },
}

/// Immutable role → permission table.
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    all: BTreeSet<Permission>,
    by_role: HashMap<Role, BTreeSet<Permission>>,
}

static EMPTY: BTreeSet<Permission> = BTreeSet::new();

impl PermissionCatalog {
    /// Builds a catalog, checking that every role has a non-empty set drawn from `all`.
    pub fn new(
        all: BTreeSet<Permission>,
        by_role: HashMap<Role, BTreeSet<Permission>>,
    ) -> Result<Self, CatalogError> {
        for role in Role::ALL {
            let granted = by_role.get(&role).ok_or(CatalogError::MissingRole(role))?;
            if granted.is_empty() {
                return Err(CatalogError::EmptyRole(role));
            }
            if let Some(permission) = granted.iter().find(|p| !all.contains(p)) {
                return Err(CatalogError::Dangling {
                    role,
                    permission: *permission,
                });
            }
        }
        Ok(Self { all, by_role })
    }

    /// The portal's built-in role table.
    pub fn standard() -> Self {
        use Permission::*;

        let table: [(Role, &[Permission]); 11] = [
            (
                Role::Trainee,
                &[ViewOwnTraining, SubmitForms, SubmitSafetyObservation, SubmitRequests],
            ),
            (
                Role::TrainingSupervisor,
                &[
                    ViewDashboard,
                    ManageTrainees,
                    IssuePasscodes,
                    AssignTraining,
                    ViewReports,
                    ExportPdf,
                    SubmitForms,
                    SubmitSafetyObservation,
                    SubmitRequests,
                ],
            ),
            (
                Role::TrainingCoordinator,
                &[
                    ViewDashboard,
                    ManageTrainees,
                    IssuePasscodes,
                    AssignTraining,
                    ViewReports,
                    ViewAnalytics,
                    ExportPdf,
                    ReviewRequests,
                    SubmitForms,
                    SubmitSafetyObservation,
                    SubmitRequests,
                ],
            ),
            (
                Role::InstructorTeamLead,
                &[
                    ViewDashboard,
                    ManageTrainees,
                    ViewReports,
                    SubmitSafetyObservation,
                    SubmitRequests,
                ],
            ),
            (
                Role::UtilityOffice,
                &[ViewDashboard, SubmitRequests, ReviewRequests],
            ),
            (
                Role::Nurse,
                &[ViewDashboard, ManageMedicalRecords, SubmitForms, SubmitRequests],
            ),
            (
                Role::SafetyCoordinator,
                &[
                    ViewDashboard,
                    ViewReports,
                    ViewAnalytics,
                    ExportPdf,
                    ReviewRequests,
                    SubmitSafetyObservation,
                ],
            ),
            (
                Role::OperationsManager,
                &[
                    ViewDashboard,
                    ManageTrainees,
                    ViewReports,
                    ViewAnalytics,
                    ExportPdf,
                    ReviewRequests,
                ],
            ),
            (
                Role::ChiefOperationsOfficer,
                &[
                    ViewDashboard,
                    ViewReports,
                    ViewAnalytics,
                    ExportPdf,
                    ReviewRequests,
                    AdminAccess,
                ],
            ),
            (
                Role::OtherStaff,
                &[ViewDashboard, SubmitSafetyObservation, SubmitRequests],
            ),
            (Role::SuperAdmin, &Permission::ALL),
        ];

        let by_role = table
            .into_iter()
            .map(|(role, perms)| (role, perms.iter().copied().collect()))
            .collect();

        Self {
            all: Permission::ALL.into_iter().collect(),
            by_role,
        }
    }

    pub fn all_permissions(&self) -> &BTreeSet<Permission> {
        &self.all
    }

    pub fn permissions_for_role(&self, role: Role) -> &BTreeSet<Permission> {
        self.by_role.get(&role).unwrap_or(&EMPTY)
    }
}

impl Default for PermissionCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
