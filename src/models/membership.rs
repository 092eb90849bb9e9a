use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::Role;
use crate::events::{Loggable, Severity};

// One record type per scope kind, mirroring the per-scope membership
// tables. Membership mutations are security relevant and log at Critical
// severity.

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrganizationMember {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Loggable for OrganizationMember {
    fn entity_type() -> &'static str { "organization_member" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkspaceMember {
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Loggable for WorkspaceMember {
    fn entity_type() -> &'static str { "workspace_member" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectMember {
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Loggable for ProjectMember {
    fn entity_type() -> &'static str { "project_member" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

/// Membership row joined with the member's user record, for listings.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MemberView {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    #[schema(example = "member")]
    pub role: Role,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateMemberRoleRequest {
    #[schema(example = "manager")]
    pub role: Role,
}
