//! Universal search within an organization. Uses the same elevated-access
//! predicate as analytics: elevated callers search everything in the
//! organization, others only the tasks they are assigned to or reported.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{is_elevated, ScopeKind, SqliteMembershipResolver};
use crate::db::uuid_sql::{case_uuid, match_uuid_clause};
use crate::errors::AppResult;
use crate::jwt::AuthUser;
use crate::routes::analytics::ViewScope;

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchParams {
    /// Substring matched against project names and task titles.
    pub q: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectHit {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskHit {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResults {
    pub query: String,
    pub view: ViewScope,
    pub projects: Vec<ProjectHit>,
    pub tasks: Vec<TaskHit>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/organizations/:organizationId/search", get(search))
}

#[utoipa::path(
    get,
    path = "/organizations/{organizationId}/search",
    tag = "Search",
    security(("bearerAuth" = [])),
    params(
        ("organizationId" = Uuid, Path, description = "Organization id"),
        SearchParams
    ),
    responses((status = 200, description = "Matching projects and tasks", body = SearchResults))
)]
pub(crate) async fn search(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(organization_id): Path<Uuid>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<SearchResults>> {
    let resolver = SqliteMembershipResolver::new(state.pool.clone());
    let elevated = is_elevated(
        &auth.actor(),
        ScopeKind::Organization,
        &organization_id.to_string(),
        &resolver,
    )
    .await?;

    let pattern = format!("%{}%", params.q);
    let org = organization_id.to_string();

    let (view, projects, tasks) = if elevated {
        let projects = search_projects(&state.pool, &org, &pattern).await?;
        let tasks = search_tasks(&state.pool, &org, &pattern, None).await?;
        (ViewScope::Organization, projects, tasks)
    } else {
        let tasks = search_tasks(&state.pool, &org, &pattern, Some(auth.user_id)).await?;
        (ViewScope::SelfOnly, Vec::new(), tasks)
    };

    Ok(Json(SearchResults {
        query: params.q,
        view,
        projects,
        tasks,
    }))
}

async fn search_projects(
    pool: &SqlitePool,
    organization_id: &str,
    pattern: &str,
) -> AppResult<Vec<ProjectHit>> {
    let sql = format!(
        "SELECT {}, p.name, p.slug FROM projects p \
         JOIN workspaces w ON p.workspace_id = w.id \
         WHERE {} AND p.name LIKE ? ORDER BY p.name",
        case_uuid("p.id"),
        match_uuid_clause("w.organization_id")
    );

    let rows = sqlx::query(&sql)
        .bind(organization_id)
        .bind(organization_id)
        .bind(pattern)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let id: String = row.get("id");
            Some(ProjectHit {
                id: Uuid::parse_str(&id).ok()?,
                name: row.get("name"),
                slug: row.get("slug"),
            })
        })
        .collect())
}

async fn search_tasks(
    pool: &SqlitePool,
    organization_id: &str,
    pattern: &str,
    only_for: Option<Uuid>,
) -> AppResult<Vec<TaskHit>> {
    let self_clause = if only_for.is_some() {
        " AND (t.assignee_id = ? OR t.reporter_id = ?)"
    } else {
        ""
    };

    let sql = format!(
        "SELECT {}, {}, t.title, t.status FROM tasks t \
         JOIN projects p ON t.project_id = p.id \
         JOIN workspaces w ON p.workspace_id = w.id \
         WHERE {} AND t.deleted_at IS NULL AND t.title LIKE ?{} ORDER BY t.title",
        case_uuid("t.id"),
        case_uuid("t.project_id"),
        match_uuid_clause("w.organization_id"),
        self_clause
    );

    let mut query = sqlx::query(&sql)
        .bind(organization_id)
        .bind(organization_id)
        .bind(pattern);
    if let Some(user_id) = only_for {
        let user = user_id.to_string();
        query = query.bind(user.clone()).bind(user);
    }

    let rows = query.fetch_all(pool).await?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let id: String = row.get("id");
            let project_id: String = row.get("project_id");
            Some(TaskHit {
                id: Uuid::parse_str(&id).ok()?,
                project_id: Uuid::parse_str(&project_id).ok()?,
                title: row.get("title"),
                status: row.get("status"),
            })
        })
        .collect())
}
