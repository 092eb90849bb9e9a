//! Organization analytics.
//!
//! Elevated callers (manager-or-above, organization owner, super admin)
//! see organization-wide aggregates; everyone else sees only the tasks
//! they are assigned to or reported. The split is decided by the
//! elevated-access predicate, never re-derived here.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{is_elevated, ScopeKind, SqliteMembershipResolver};
use crate::db::uuid_sql::match_uuid_clause;
use crate::errors::AppResult;
use crate::jwt::AuthUser;

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub enum ViewScope {
    #[serde(rename = "organization")]
    Organization,
    #[serde(rename = "self")]
    SelfOnly,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyticsOverview {
    pub organization_id: Uuid,
    pub view: ViewScope,
    pub project_count: i64,
    pub task_count: i64,
    pub tasks_by_status: Vec<StatusCount>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/organizations/:organizationId/analytics/overview",
        get(overview),
    )
}

#[utoipa::path(
    get,
    path = "/organizations/{organizationId}/analytics/overview",
    tag = "Analytics",
    security(("bearerAuth" = [])),
    params(("organizationId" = Uuid, Path, description = "Organization id")),
    responses((status = 200, description = "Project and task aggregates", body = AnalyticsOverview))
)]
pub(crate) async fn overview(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(organization_id): Path<Uuid>,
) -> AppResult<Json<AnalyticsOverview>> {
    let resolver = SqliteMembershipResolver::new(state.pool.clone());
    let elevated = is_elevated(
        &auth.actor(),
        ScopeKind::Organization,
        &organization_id.to_string(),
        &resolver,
    )
    .await?;

    let overview = if elevated {
        organization_overview(&state.pool, organization_id).await?
    } else {
        self_overview(&state.pool, organization_id, auth.user_id).await?
    };

    Ok(Json(overview))
}

async fn organization_overview(
    pool: &SqlitePool,
    organization_id: Uuid,
) -> AppResult<AnalyticsOverview> {
    let org = organization_id.to_string();

    let sql = format!(
        "SELECT COUNT(1) FROM projects p JOIN workspaces w ON p.workspace_id = w.id WHERE {}",
        match_uuid_clause("w.organization_id")
    );
    let project_count: i64 = sqlx::query_scalar(&sql).bind(&org).bind(&org).fetch_one(pool).await?;

    let sql = format!(
        "SELECT COUNT(1) FROM tasks t \
         JOIN projects p ON t.project_id = p.id \
         JOIN workspaces w ON p.workspace_id = w.id \
         WHERE {} AND t.deleted_at IS NULL",
        match_uuid_clause("w.organization_id")
    );
    let task_count: i64 = sqlx::query_scalar(&sql).bind(&org).bind(&org).fetch_one(pool).await?;

    let sql = format!(
        "SELECT t.status as status, COUNT(1) as count FROM tasks t \
         JOIN projects p ON t.project_id = p.id \
         JOIN workspaces w ON p.workspace_id = w.id \
         WHERE {} AND t.deleted_at IS NULL GROUP BY t.status ORDER BY t.status",
        match_uuid_clause("w.organization_id")
    );
    let rows = sqlx::query(&sql).bind(&org).bind(&org).fetch_all(pool).await?;
    let tasks_by_status = rows
        .iter()
        .map(|row| StatusCount { status: row.get("status"), count: row.get("count") })
        .collect();

    Ok(AnalyticsOverview {
        organization_id,
        view: ViewScope::Organization,
        project_count,
        task_count,
        tasks_by_status,
    })
}

async fn self_overview(
    pool: &SqlitePool,
    organization_id: Uuid,
    user_id: Uuid,
) -> AppResult<AnalyticsOverview> {
    let org = organization_id.to_string();
    let user = user_id.to_string();

    let sql = format!(
        "SELECT COUNT(1) FROM project_members pm \
         JOIN projects p ON pm.project_id = p.id \
         JOIN workspaces w ON p.workspace_id = w.id \
         WHERE {} AND pm.user_id = ?",
        match_uuid_clause("w.organization_id")
    );
    let project_count: i64 = sqlx::query_scalar(&sql)
        .bind(&org)
        .bind(&org)
        .bind(&user)
        .fetch_one(pool)
        .await?;

    let sql = format!(
        "SELECT COUNT(1) FROM tasks t \
         JOIN projects p ON t.project_id = p.id \
         JOIN workspaces w ON p.workspace_id = w.id \
         WHERE {} AND t.deleted_at IS NULL AND (t.assignee_id = ? OR t.reporter_id = ?)",
        match_uuid_clause("w.organization_id")
    );
    let task_count: i64 = sqlx::query_scalar(&sql)
        .bind(&org)
        .bind(&org)
        .bind(&user)
        .bind(&user)
        .fetch_one(pool)
        .await?;

    let sql = format!(
        "SELECT t.status as status, COUNT(1) as count FROM tasks t \
         JOIN projects p ON t.project_id = p.id \
         JOIN workspaces w ON p.workspace_id = w.id \
         WHERE {} AND t.deleted_at IS NULL AND (t.assignee_id = ? OR t.reporter_id = ?) \
         GROUP BY t.status ORDER BY t.status",
        match_uuid_clause("w.organization_id")
    );
    let rows = sqlx::query(&sql)
        .bind(&org)
        .bind(&org)
        .bind(&user)
        .bind(&user)
        .fetch_all(pool)
        .await?;
    let tasks_by_status = rows
        .iter()
        .map(|row| StatusCount { status: row.get("status"), count: row.get("count") })
        .collect();

    Ok(AnalyticsOverview {
        organization_id,
        view: ViewScope::SelfOnly,
        project_count,
        task_count,
        tasks_by_status,
    })
}
