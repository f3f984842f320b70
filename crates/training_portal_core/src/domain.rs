//! crates/training_portal_core/src/domain.rs
//!
//! Defines the pure, core data structures for the training portal.
//! These types carry no I/O; they serialize to JSON for the local cache
//! and for the remote record collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Roles and Permissions
//=========================================================================================

/// A named category of user. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Trainee,
    TrainingSupervisor,
    TrainingCoordinator,
    InstructorTeamLead,
    UtilityOffice,
    Nurse,
    SafetyCoordinator,
    OperationsManager,
    ChiefOperationsOfficer,
    OtherStaff,
    SuperAdmin,
}

/// The view a user lands on right after login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandingView {
    TraineeDashboard,
    TrainingDashboard,
    MedicalDashboard,
    SafetyDashboard,
    OperationsDashboard,
    StaffDashboard,
    AdminPanel,
}

impl Role {
    pub const ALL: [Role; 11] = [
        Role::Trainee,
        Role::TrainingSupervisor,
        Role::TrainingCoordinator,
        Role::InstructorTeamLead,
        Role::UtilityOffice,
        Role::Nurse,
        Role::SafetyCoordinator,
        Role::OperationsManager,
        Role::ChiefOperationsOfficer,
        Role::OtherStaff,
        Role::SuperAdmin,
    ];

    /// The snake_case identifier used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Trainee => "trainee",
            Role::TrainingSupervisor => "training_supervisor",
            Role::TrainingCoordinator => "training_coordinator",
            Role::InstructorTeamLead => "instructor_team_lead",
            Role::UtilityOffice => "utility_office",
            Role::Nurse => "nurse",
            Role::SafetyCoordinator => "safety_coordinator",
            Role::OperationsManager => "operations_manager",
            Role::ChiefOperationsOfficer => "chief_operations_officer",
            Role::OtherStaff => "other_staff",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Human readable label, as shown in the role picker.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Trainee => "Trainee",
            Role::TrainingSupervisor => "Training Supervisor",
            Role::TrainingCoordinator => "Training Coordinator",
            Role::InstructorTeamLead => "Instructor/Team Lead",
            Role::UtilityOffice => "Utility Office",
            Role::Nurse => "Nurse",
            Role::SafetyCoordinator => "Safety Coordinator",
            Role::OperationsManager => "Operations Manager",
            Role::ChiefOperationsOfficer => "Chief Operations Officer",
            Role::OtherStaff => "Other Staff",
            Role::SuperAdmin => "Super Admin",
        }
    }

    pub fn landing_view(&self) -> LandingView {
        match self {
            Role::Trainee => LandingView::TraineeDashboard,
            Role::TrainingSupervisor | Role::TrainingCoordinator | Role::InstructorTeamLead => {
                LandingView::TrainingDashboard
            }
            Role::Nurse => LandingView::MedicalDashboard,
            Role::SafetyCoordinator => LandingView::SafetyDashboard,
            Role::OperationsManager | Role::ChiefOperationsOfficer => {
                LandingView::OperationsDashboard
            }
            Role::UtilityOffice | Role::OtherStaff => LandingView::StaffDashboard,
            Role::SuperAdmin => LandingView::AdminPanel,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    /// Accepts the wire identifier or the human label, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(needle) || r.label().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// An atomic capability flag checked before gating an action or view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewDashboard,
    ViewOwnTraining,
    SubmitForms,
    SubmitSafetyObservation,
    SubmitRequests,
    ReviewRequests,
    ManageTrainees,
    IssuePasscodes,
    AssignTraining,
    ViewReports,
    ViewAnalytics,
    ExportPdf,
    ManageMedicalRecords,
    ManageUsers,
    AdminAccess,
}

impl Permission {
    pub const ALL: [Permission; 15] = [
        Permission::ViewDashboard,
        Permission::ViewOwnTraining,
        Permission::SubmitForms,
        Permission::SubmitSafetyObservation,
        Permission::SubmitRequests,
        Permission::ReviewRequests,
        Permission::ManageTrainees,
        Permission::IssuePasscodes,
        Permission::AssignTraining,
        Permission::ViewReports,
        Permission::ViewAnalytics,
        Permission::ExportPdf,
        Permission::ManageMedicalRecords,
        Permission::ManageUsers,
        Permission::AdminAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewDashboard => "view_dashboard",
            Permission::ViewOwnTraining => "view_own_training",
            Permission::SubmitForms => "submit_forms",
            Permission::SubmitSafetyObservation => "submit_safety_observation",
            Permission::SubmitRequests => "submit_requests",
            Permission::ReviewRequests => "review_requests",
            Permission::ManageTrainees => "manage_trainees",
            Permission::IssuePasscodes => "issue_passcodes",
            Permission::AssignTraining => "assign_training",
            Permission::ViewReports => "view_reports",
            Permission::ViewAnalytics => "view_analytics",
            Permission::ExportPdf => "export_pdf",
            Permission::ManageMedicalRecords => "manage_medical_records",
            Permission::ManageUsers => "manage_users",
            Permission::AdminAccess => "admin_access",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//=========================================================================================
// Session
//=========================================================================================

/// The logged-in user for the current client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passcode: Option<String>,
}

impl UserSession {
    pub fn new(email: impl Into<String>, role: Role) -> Self {
        Self {
            email: email.into(),
            role,
            name: None,
            passcode: None,
        }
    }
}

/// Trims and lowercases an email so lookups ignore incidental formatting.
/// Emails are otherwise free-form.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

//=========================================================================================
// Passcodes
//=========================================================================================

/// A time-limited numeric access code bound to a trainee.
/// Entries are append-only: used or expired codes stay in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasscodeEntry {
    pub id: Uuid,
    pub code: String,
    pub trainee_email: String,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_by: Option<String>,
}

//=========================================================================================
// Training
//=========================================================================================

/// The fixed catalog of training modules a trainee can be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrainingModule {
    #[serde(rename = "BOSIET")]
    Bosiet,
    #[serde(rename = "FIRE WATCH")]
    FireWatch,
    #[serde(rename = "H2S AWARENESS")]
    H2sAwareness,
    #[serde(rename = "FIRST AID")]
    FirstAid,
    #[serde(rename = "CONFINED SPACE ENTRY")]
    ConfinedSpaceEntry,
    #[serde(rename = "WORKING AT HEIGHT")]
    WorkingAtHeight,
    #[serde(rename = "PERMIT TO WORK")]
    PermitToWork,
    #[serde(rename = "HUET")]
    Huet,
}

impl TrainingModule {
    pub const ALL: [TrainingModule; 8] = [
        TrainingModule::Bosiet,
        TrainingModule::FireWatch,
        TrainingModule::H2sAwareness,
        TrainingModule::FirstAid,
        TrainingModule::ConfinedSpaceEntry,
        TrainingModule::WorkingAtHeight,
        TrainingModule::PermitToWork,
        TrainingModule::Huet,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TrainingModule::Bosiet => "BOSIET",
            TrainingModule::FireWatch => "FIRE WATCH",
            TrainingModule::H2sAwareness => "H2S AWARENESS",
            TrainingModule::FirstAid => "FIRST AID",
            TrainingModule::ConfinedSpaceEntry => "CONFINED SPACE ENTRY",
            TrainingModule::WorkingAtHeight => "WORKING AT HEIGHT",
            TrainingModule::PermitToWork => "PERMIT TO WORK",
            TrainingModule::Huet => "HUET",
        }
    }
}

impl fmt::Display for TrainingModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown training module: {0}")]
pub struct UnknownModule(pub String);

impl FromStr for TrainingModule {
    type Err = UnknownModule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        TrainingModule::ALL
            .into_iter()
            .find(|m| m.label().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownModule(s.to_string()))
    }
}

/// The modules currently assigned to one trainee. Re-assignment overwrites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingAssignment {
    pub trainee_email: String,
    pub modules: Vec<TrainingModule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_by: Option<String>,
    pub assigned_at: DateTime<Utc>,
}

/// Completion figures for a trainee's current assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingProgress {
    pub assigned: Vec<TrainingModule>,
    pub completed: Vec<TrainingModule>,
    pub remaining: Vec<TrainingModule>,
    pub percent_complete: u8,
}

//=========================================================================================
// Forms, Observations and Requests
//=========================================================================================

/// Form types with a single logical slot each; a resubmission replaces the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormKind {
    Onboarding,
    MedicalFitness,
    PpeIssuance,
    TrainingEvaluation,
    SiteInduction,
}

impl FormKind {
    pub const ALL: [FormKind; 5] = [
        FormKind::Onboarding,
        FormKind::MedicalFitness,
        FormKind::PpeIssuance,
        FormKind::TrainingEvaluation,
        FormKind::SiteInduction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormKind::Onboarding => "onboarding",
            FormKind::MedicalFitness => "medical_fitness",
            FormKind::PpeIssuance => "ppe_issuance",
            FormKind::TrainingEvaluation => "training_evaluation",
            FormKind::SiteInduction => "site_induction",
        }
    }
}

impl FromStr for FormKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("Unknown form kind: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSubmission {
    pub id: Uuid,
    pub kind: FormKind,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A repeatable safety observation; observations are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyObservation {
    pub id: Uuid,
    pub observer_email: String,
    pub location: String,
    pub description: String,
    pub severity: Severity,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Request,
    Complaint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Open,
    InProgress,
    Resolved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestComplaint {
    pub id: Uuid,
    pub kind: RequestKind,
    pub submitted_by: String,
    pub subject: String,
    pub details: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//=========================================================================================
// Snapshot
//=========================================================================================

/// The full serializable state of the store at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSnapshot {
    pub user: Option<UserSession>,
    /// Keyed by normalized trainee email.
    pub assignments: BTreeMap<String, TrainingAssignment>,
    /// Keyed by normalized trainee email.
    pub completions: BTreeMap<String, BTreeSet<TrainingModule>>,
    pub forms: BTreeMap<FormKind, FormSubmission>,
    pub observations: Vec<SafetyObservation>,
    pub requests: Vec<RequestComplaint>,
    pub passcodes: Vec<PasscodeEntry>,
}
