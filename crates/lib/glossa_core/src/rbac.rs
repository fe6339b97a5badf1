//! Role-based access control.
//!
//! Project roles form a fixed hierarchy `Viewer < Editor < Reviewer < Admin`.
//! Each role owns an explicitly enumerated, cumulative permission table so a
//! check is plain set membership. A system `Admin` bypasses project checks.
//! Absence of a role record never grants anything.

use serde::{Deserialize, Serialize};

/// Role a user holds inside one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectRole {
    Viewer,
    Editor,
    Reviewer,
    Admin,
}

impl ProjectRole {
    pub const ALL: [ProjectRole; 4] = [
        ProjectRole::Viewer,
        ProjectRole::Editor,
        ProjectRole::Reviewer,
        ProjectRole::Admin,
    ];

    /// Position in the hierarchy, starting at 1.
    pub fn rank(self) -> u8 {
        match self {
            ProjectRole::Viewer => 1,
            ProjectRole::Editor => 2,
            ProjectRole::Reviewer => 3,
            ProjectRole::Admin => 4,
        }
    }

    /// Database text representation.
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectRole::Viewer => "VIEWER",
            ProjectRole::Editor => "EDITOR",
            ProjectRole::Reviewer => "REVIEWER",
            ProjectRole::Admin => "ADMIN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "VIEWER" => Some(ProjectRole::Viewer),
            "EDITOR" => Some(ProjectRole::Editor),
            "REVIEWER" => Some(ProjectRole::Reviewer),
            "ADMIN" => Some(ProjectRole::Admin),
            _ => None,
        }
    }

    pub fn permissions(self) -> &'static [Permission] {
        match self {
            ProjectRole::Viewer => VIEWER_PERMISSIONS,
            ProjectRole::Editor => EDITOR_PERMISSIONS,
            ProjectRole::Reviewer => REVIEWER_PERMISSIONS,
            ProjectRole::Admin => ADMIN_PERMISSIONS,
        }
    }
}

impl std::fmt::Display for ProjectRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// System-wide role. `Admin` is the only grantable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemRole {
    Admin,
}

impl SystemRole {
    /// Database text representation.
    pub fn as_str(self) -> &'static str {
        match self {
            SystemRole::Admin => "ADMIN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ADMIN" => Some(SystemRole::Admin),
            _ => None,
        }
    }

    /// Claim value carried in access tokens.
    pub fn claim(self) -> &'static str {
        match self {
            SystemRole::Admin => "admin",
        }
    }
}

/// Capability on a project resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    ProjectView,
    DocumentView,
    TranslationView,
    CommentView,
    ExportDownload,
    DocumentUpload,
    TranslationEdit,
    CommentCreate,
    AiTranslate,
    TranslationReview,
    TranslationApprove,
    CommentResolve,
    ProjectEdit,
    ProjectDelete,
    MembersManage,
    ProjectSettings,
}

impl Permission {
    /// Every permission defined anywhere in the system.
    pub const ALL: [Permission; 16] = [
        Permission::ProjectView,
        Permission::DocumentView,
        Permission::TranslationView,
        Permission::CommentView,
        Permission::ExportDownload,
        Permission::DocumentUpload,
        Permission::TranslationEdit,
        Permission::CommentCreate,
        Permission::AiTranslate,
        Permission::TranslationReview,
        Permission::TranslationApprove,
        Permission::CommentResolve,
        Permission::ProjectEdit,
        Permission::ProjectDelete,
        Permission::MembersManage,
        Permission::ProjectSettings,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::ProjectView => "project.view",
            Permission::DocumentView => "document.view",
            Permission::TranslationView => "translation.view",
            Permission::CommentView => "comment.view",
            Permission::ExportDownload => "export.download",
            Permission::DocumentUpload => "document.upload",
            Permission::TranslationEdit => "translation.edit",
            Permission::CommentCreate => "comment.create",
            Permission::AiTranslate => "ai.translate",
            Permission::TranslationReview => "translation.review",
            Permission::TranslationApprove => "translation.approve",
            Permission::CommentResolve => "comment.resolve",
            Permission::ProjectEdit => "project.edit",
            Permission::ProjectDelete => "project.delete",
            Permission::MembersManage => "members.manage",
            Permission::ProjectSettings => "project.settings",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == value)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const VIEWER_PERMISSIONS: &[Permission] = &[
    Permission::ProjectView,
    Permission::DocumentView,
    Permission::TranslationView,
    Permission::CommentView,
    Permission::ExportDownload,
];

const EDITOR_PERMISSIONS: &[Permission] = &[
    Permission::ProjectView,
    Permission::DocumentView,
    Permission::TranslationView,
    Permission::CommentView,
    Permission::ExportDownload,
    Permission::DocumentUpload,
    Permission::TranslationEdit,
    Permission::CommentCreate,
    Permission::AiTranslate,
];

const REVIEWER_PERMISSIONS: &[Permission] = &[
    Permission::ProjectView,
    Permission::DocumentView,
    Permission::TranslationView,
    Permission::CommentView,
    Permission::ExportDownload,
    Permission::DocumentUpload,
    Permission::TranslationEdit,
    Permission::CommentCreate,
    Permission::AiTranslate,
    Permission::TranslationReview,
    Permission::TranslationApprove,
    Permission::CommentResolve,
];

const ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::ProjectView,
    Permission::DocumentView,
    Permission::TranslationView,
    Permission::CommentView,
    Permission::ExportDownload,
    Permission::DocumentUpload,
    Permission::TranslationEdit,
    Permission::CommentCreate,
    Permission::AiTranslate,
    Permission::TranslationReview,
    Permission::TranslationApprove,
    Permission::CommentResolve,
    Permission::ProjectEdit,
    Permission::ProjectDelete,
    Permission::MembersManage,
    Permission::ProjectSettings,
];

/// `true` when `user` ranks at or above `required`.
pub fn has_role(user: ProjectRole, required: ProjectRole) -> bool {
    user.rank() >= required.rank()
}

/// `true` when `user` satisfies at least one of `required`.
pub fn has_any_role(user: ProjectRole, required: &[ProjectRole]) -> bool {
    required.iter().any(|r| has_role(user, *r))
}

pub fn has_permission(role: ProjectRole, permission: Permission) -> bool {
    role.permissions().contains(&permission)
}

/// String form of [`has_permission`]. Unknown permission names are denied.
pub fn has_permission_str(role: ProjectRole, permission: &str) -> bool {
    Permission::parse(permission).is_some_and(|p| has_permission(role, p))
}

/// What a guarded operation demands of the caller.
#[derive(Debug, Clone, Copy)]
pub enum Requirement<'a> {
    Role(ProjectRole),
    AnyRole(&'a [ProjectRole]),
    Permission(Permission),
}

/// Roles known for the caller at evaluation time.
#[derive(Debug, Clone, Copy, Default)]
pub struct Subject {
    pub system_role: Option<SystemRole>,
    /// Membership role in the project being checked, when the check is
    /// project-scoped and a membership exists.
    pub project_role: Option<ProjectRole>,
}

/// Evaluate `requirement` for `subject`.
///
/// A system admin short-circuits to full access. Otherwise the project role
/// is the only role considered; without one the answer is deny.
pub fn evaluate(subject: Subject, requirement: Requirement<'_>) -> bool {
    if subject.system_role == Some(SystemRole::Admin) {
        return true;
    }
    let Some(role) = subject.project_role else {
        return false;
    };
    match requirement {
        Requirement::Role(required) => has_role(role, required),
        Requirement::AnyRole(required) => has_any_role(role, required),
        Requirement::Permission(permission) => has_permission(role, permission),
    }
}
