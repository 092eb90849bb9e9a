use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Role;
use crate::db::row_parsers::{member_view_from_row, project_from_row};
use crate::db::uuid_sql::{case_uuid, match_uuid_clause};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::membership::{AddMemberRequest, MemberView, ProjectMember, UpdateMemberRoleRequest};
use crate::models::project::{Project, ProjectCreateRequest, ProjectUpdateRequest};
use crate::utils::{slugify, utc_now};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/workspaces/:workspaceId/projects", get(list_projects))
        .route("/projects", post(create_project))
        .route(
            "/projects/:projectId",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/projects/by-slug/:slug", get(get_project_by_slug))
        .route("/projects/:projectId/members", get(list_members).post(add_member))
        .route(
            "/projects/:projectId/members/:userId",
            put(update_member_role).delete(remove_member),
        )
}

#[utoipa::path(
    get,
    path = "/workspaces/{workspaceId}/projects",
    tag = "Projects",
    security(("bearerAuth" = [])),
    params(("workspaceId" = Uuid, Path, description = "Workspace id")),
    responses((status = 200, description = "Projects in the workspace", body = [Project]))
)]
pub(crate) async fn list_projects(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
) -> AppResult<Json<Vec<Project>>> {
    let sql = format!(
        "SELECT {}, {}, name, slug, visibility, {}, created_at, updated_at FROM projects WHERE {} ORDER BY created_at DESC",
        case_uuid("id"),
        case_uuid("workspace_id"),
        case_uuid("created_by"),
        match_uuid_clause("workspace_id")
    );

    let rows = sqlx::query(&sql)
        .bind(workspace_id.to_string())
        .bind(workspace_id.to_string())
        .fetch_all(&state.pool)
        .await?;

    let projects = rows.iter().map(project_from_row).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(projects))
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    security(("bearerAuth" = [])),
    request_body = ProjectCreateRequest,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 409, description = "Slug already taken")
    )
)]
pub(crate) async fn create_project(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    super::workspaces::fetch_workspace(&state.pool, payload.workspace_id).await?;

    let slug = payload.slug.unwrap_or_else(|| slugify(&payload.name));
    if slug.is_empty() {
        return Err(AppError::bad_request("project slug must not be empty"));
    }
    ensure_slug_available(&state.pool, &slug).await?;

    let now = utc_now();
    let project_id = Uuid::new_v4();

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO projects (id, workspace_id, name, slug, visibility, created_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(project_id.to_string())
    .bind(payload.workspace_id.to_string())
    .bind(&payload.name)
    .bind(&slug)
    .bind(payload.visibility.as_str())
    .bind(auth.user_id.to_string())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO project_members (user_id, project_id, role, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(auth.user_id.to_string())
    .bind(project_id.to_string())
    .bind(Role::Owner.as_str())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let project = Project {
        id: project_id,
        workspace_id: payload.workspace_id,
        name: payload.name,
        slug,
        visibility: payload.visibility,
        created_by: auth.user_id,
        created_at: now,
        updated_at: now,
    };

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &project,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/projects/{projectId}",
    tag = "Projects",
    security(("bearerAuth" = [])),
    params(("projectId" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Project detail", body = Project))
)]
pub(crate) async fn get_project(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Project>> {
    let project = fetch_project(&state.pool, project_id).await?;
    Ok(Json(project))
}

#[utoipa::path(
    get,
    path = "/projects/by-slug/{slug}",
    tag = "Projects",
    security(("bearerAuth" = [])),
    params(("slug" = String, Path, description = "Project slug")),
    responses((status = 200, description = "Project detail", body = Project))
)]
pub(crate) async fn get_project_by_slug(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(slug): Path<String>,
) -> AppResult<Json<Project>> {
    let sql = format!(
        "SELECT {}, {}, name, slug, visibility, {}, created_at, updated_at FROM projects WHERE slug = ?",
        case_uuid("id"),
        case_uuid("workspace_id"),
        case_uuid("created_by")
    );

    let row = sqlx::query(&sql)
        .bind(&slug)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("project not found"))?;

    Ok(Json(project_from_row(&row)?))
}

#[utoipa::path(
    put,
    path = "/projects/{projectId}",
    tag = "Projects",
    security(("bearerAuth" = [])),
    params(("projectId" = Uuid, Path, description = "Project id")),
    request_body = ProjectUpdateRequest,
    responses((status = 200, description = "Project updated", body = Project))
)]
pub(crate) async fn update_project(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<ProjectUpdateRequest>,
) -> AppResult<Json<Project>> {
    let old = fetch_project(&state.pool, project_id).await?;
    let mut project = old.clone();

    if let Some(name) = payload.name {
        project.name = name;
    }
    if let Some(visibility) = payload.visibility {
        project.visibility = visibility;
    }
    project.updated_at = utc_now();

    let sql = format!(
        "UPDATE projects SET name = ?, visibility = ?, updated_at = ? WHERE {}",
        match_uuid_clause("id")
    );
    sqlx::query(&sql)
        .bind(&project.name)
        .bind(project.visibility.as_str())
        .bind(project.updated_at)
        .bind(project_id.to_string())
        .bind(project_id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &project,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(project))
}

#[utoipa::path(
    delete,
    path = "/projects/{projectId}",
    tag = "Projects",
    security(("bearerAuth" = [])),
    params(("projectId" = Uuid, Path, description = "Project id")),
    responses((status = 204, description = "Project deleted"))
)]
pub(crate) async fn delete_project(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let project = fetch_project(&state.pool, project_id).await?;

    let sql = format!("DELETE FROM projects WHERE {}", match_uuid_clause("id"));
    sqlx::query(&sql)
        .bind(project_id.to_string())
        .bind(project_id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &project,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/projects/{projectId}/members",
    tag = "Projects",
    security(("bearerAuth" = [])),
    params(("projectId" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Project members", body = [MemberView]))
)]
pub(crate) async fn list_members(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<MemberView>>> {
    let sql = format!(
        "SELECT {}, u.name, u.email, m.role, m.created_at FROM project_members m \
         JOIN users u ON u.id = m.user_id \
         WHERE {} ORDER BY m.created_at",
        case_uuid("m.user_id"),
        match_uuid_clause("m.project_id")
    );

    let rows = sqlx::query(&sql)
        .bind(project_id.to_string())
        .bind(project_id.to_string())
        .fetch_all(&state.pool)
        .await?;

    let members = rows.iter().map(member_view_from_row).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(members))
}

#[utoipa::path(
    post,
    path = "/projects/{projectId}/members",
    tag = "Projects",
    security(("bearerAuth" = [])),
    params(("projectId" = Uuid, Path, description = "Project id")),
    request_body = AddMemberRequest,
    responses((status = 201, description = "Member added", body = ProjectMember))
)]
pub(crate) async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<AddMemberRequest>,
) -> AppResult<(StatusCode, Json<ProjectMember>)> {
    fetch_project(&state.pool, project_id).await?;
    ensure_user_exists(&state.pool, payload.user_id).await?;

    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM project_members WHERE user_id = ? AND project_id = ?",
    )
    .bind(payload.user_id.to_string())
    .bind(project_id.to_string())
    .fetch_one(&state.pool)
    .await?;
    if existing > 0 {
        return Err(AppError::conflict("user is already a member of this project"));
    }

    let now = utc_now();
    sqlx::query(
        "INSERT INTO project_members (user_id, project_id, role, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(payload.user_id.to_string())
    .bind(project_id.to_string())
    .bind(payload.role.as_str())
    .bind(now)
    .execute(&state.pool)
    .await?;

    let member = ProjectMember {
        user_id: payload.user_id,
        project_id,
        role: payload.role,
        created_at: now,
    };

    log_activity_with_context(
        &state.event_bus,
        "added",
        Some(auth.user_id),
        &member,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(member)))
}

#[utoipa::path(
    put,
    path = "/projects/{projectId}/members/{userId}",
    tag = "Projects",
    security(("bearerAuth" = [])),
    params(
        ("projectId" = Uuid, Path, description = "Project id"),
        ("userId" = Uuid, Path, description = "Member user id")
    ),
    request_body = UpdateMemberRoleRequest,
    responses((status = 200, description = "Member role changed", body = ProjectMember))
)]
pub(crate) async fn update_member_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateMemberRoleRequest>,
) -> AppResult<Json<ProjectMember>> {
    let old = fetch_member(&state.pool, project_id, user_id).await?;

    sqlx::query("UPDATE project_members SET role = ? WHERE user_id = ? AND project_id = ?")
        .bind(payload.role.as_str())
        .bind(user_id.to_string())
        .bind(project_id.to_string())
        .execute(&state.pool)
        .await?;

    let member = ProjectMember { role: payload.role, ..old.clone() };

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &member,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(member))
}

#[utoipa::path(
    delete,
    path = "/projects/{projectId}/members/{userId}",
    tag = "Projects",
    security(("bearerAuth" = [])),
    params(
        ("projectId" = Uuid, Path, description = "Project id"),
        ("userId" = Uuid, Path, description = "Member user id")
    ),
    responses((status = 204, description = "Member removed"))
)]
pub(crate) async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let member = fetch_member(&state.pool, project_id, user_id).await?;

    sqlx::query("DELETE FROM project_members WHERE user_id = ? AND project_id = ?")
        .bind(user_id.to_string())
        .bind(project_id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "removed",
        Some(auth.user_id),
        &member,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch_project(pool: &SqlitePool, project_id: Uuid) -> AppResult<Project> {
    let sql = format!(
        "SELECT {}, {}, name, slug, visibility, {}, created_at, updated_at FROM projects WHERE {}",
        case_uuid("id"),
        case_uuid("workspace_id"),
        case_uuid("created_by"),
        match_uuid_clause("id")
    );

    let row = sqlx::query(&sql)
        .bind(project_id.to_string())
        .bind(project_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("project not found"))?;

    project_from_row(&row)
}

async fn fetch_member(pool: &SqlitePool, project_id: Uuid, user_id: Uuid) -> AppResult<ProjectMember> {
    let row = sqlx::query(
        "SELECT role, created_at FROM project_members WHERE user_id = ? AND project_id = ?",
    )
    .bind(user_id.to_string())
    .bind(project_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("membership not found"))?;

    let role: String = row.get("role");
    let role = Role::parse(&role)
        .ok_or_else(|| AppError::internal(format!("unknown role: {role}")))?;

    Ok(ProjectMember {
        user_id,
        project_id,
        role,
        created_at: row.get("created_at"),
    })
}

async fn ensure_slug_available(pool: &SqlitePool, slug: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM projects WHERE slug = ?")
        .bind(slug)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("project slug already taken"));
    }

    Ok(())
}

async fn ensure_user_exists(pool: &SqlitePool, user_id: Uuid) -> AppResult<()> {
    let sql = format!(
        "SELECT COUNT(1) FROM users WHERE {} AND deleted_at IS NULL",
        match_uuid_clause("id")
    );
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(user_id.to_string())
        .bind(user_id.to_string())
        .fetch_one(pool)
        .await?;

    if count == 0 {
        return Err(AppError::not_found("user not found"));
    }

    Ok(())
}
