use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::uuid_sql::match_uuid_clause;
use crate::errors::AppResult;
use crate::models::project::Visibility;

use super::role::Role;
use super::scope::ScopeKind;

/// What the decision procedure needs to know about a project before the
/// membership step: its canonical id and whether it is publicly readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectRef {
    pub id: Uuid,
    pub visibility: Visibility,
}

/// Read side of the membership tables, injected into the decision procedure
/// so it stays a pure function over (user, operation, membership state).
///
/// `scope_id` is the raw locator value from the request; implementations
/// must treat a value that matches no row as "no membership" rather than an
/// error.
#[async_trait]
pub trait MembershipResolver: Send + Sync {
    /// The user's role at the given scope, or `None` when no membership row
    /// exists.
    async fn membership(
        &self,
        kind: ScopeKind,
        user_id: Uuid,
        scope_id: &str,
    ) -> AppResult<Option<Role>>;

    /// Resolve a project slug to its id and visibility.
    async fn project_by_slug(&self, slug: &str) -> AppResult<Option<ProjectRef>>;

    /// Resolve a project id to its canonical reference.
    async fn project_by_id(&self, project_id: &str) -> AppResult<Option<ProjectRef>>;

    /// The `owner_id` foreign key on the organization row, used by the
    /// elevated-access fallback for owners without an explicit membership.
    async fn organization_owner(&self, organization_id: &str) -> AppResult<Option<Uuid>>;
}

/// Resolver backed by the SQLite membership tables.
#[derive(Clone)]
pub struct SqliteMembershipResolver {
    pool: SqlitePool,
}

impl SqliteMembershipResolver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipResolver for SqliteMembershipResolver {
    async fn membership(
        &self,
        kind: ScopeKind,
        user_id: Uuid,
        scope_id: &str,
    ) -> AppResult<Option<Role>> {
        let (table, scope_column) = match kind {
            ScopeKind::Organization => ("organization_members", "organization_id"),
            ScopeKind::Workspace => ("workspace_members", "workspace_id"),
            ScopeKind::Project => ("project_members", "project_id"),
        };

        let sql = format!(
            "SELECT role FROM {} WHERE user_id = ? AND {}",
            table,
            match_uuid_clause(scope_column)
        );

        let row = sqlx::query(&sql)
            .bind(user_id.to_string())
            .bind(scope_id)
            .bind(scope_id)
            .fetch_optional(&self.pool)
            .await?;

        let role = row.and_then(|row| {
            let value: String = row.get("role");
            let role = Role::parse(&value);
            if role.is_none() {
                tracing::warn!(table = table, role = %value, "unknown role in membership table");
            }
            role
        });

        Ok(role)
    }

    async fn project_by_slug(&self, slug: &str) -> AppResult<Option<ProjectRef>> {
        let row = sqlx::query("SELECT id, visibility FROM projects WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(project_ref_from_row))
    }

    async fn project_by_id(&self, project_id: &str) -> AppResult<Option<ProjectRef>> {
        let sql = format!(
            "SELECT id, visibility FROM projects WHERE {}",
            match_uuid_clause("id")
        );

        let row = sqlx::query(&sql)
            .bind(project_id)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(project_ref_from_row))
    }

    async fn organization_owner(&self, organization_id: &str) -> AppResult<Option<Uuid>> {
        let sql = format!(
            "SELECT owner_id FROM organizations WHERE {}",
            match_uuid_clause("id")
        );

        let row = sqlx::query(&sql)
            .bind(organization_id)
            .bind(organization_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|row| {
            let value: String = row.get("owner_id");
            Uuid::parse_str(&value).ok()
        }))
    }
}

fn project_ref_from_row(row: sqlx::sqlite::SqliteRow) -> Option<ProjectRef> {
    let id: String = row.get("id");
    let visibility: String = row.get("visibility");
    Some(ProjectRef {
        id: Uuid::parse_str(&id).ok()?,
        visibility: Visibility::parse(&visibility)?,
    })
}
