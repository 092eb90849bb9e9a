use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::Loggable;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Workspace {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Workspace {
    fn entity_type() -> &'static str { "workspace" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WorkspaceCreateRequest {
    #[schema(example = "Platform Engineering")]
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WorkspaceUpdateRequest {
    pub name: Option<String>,
}
