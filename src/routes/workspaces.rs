use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::{Json, Router};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Role;
use crate::db::row_parsers::{member_view_from_row, workspace_from_row};
use crate::db::uuid_sql::{case_uuid, match_uuid_clause};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::membership::{AddMemberRequest, MemberView, UpdateMemberRoleRequest, WorkspaceMember};
use crate::models::workspace::{Workspace, WorkspaceCreateRequest, WorkspaceUpdateRequest};
use crate::utils::utc_now;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/organizations/:organizationId/workspaces",
            get(list_workspaces).post(create_workspace),
        )
        .route(
            "/workspaces/:workspaceId",
            get(get_workspace).put(update_workspace).delete(delete_workspace),
        )
        .route("/workspaces/:workspaceId/members", get(list_members).post(add_member))
        .route(
            "/workspaces/:workspaceId/members/:userId",
            put(update_member_role).delete(remove_member),
        )
}

#[utoipa::path(
    get,
    path = "/organizations/{organizationId}/workspaces",
    tag = "Workspaces",
    security(("bearerAuth" = [])),
    params(("organizationId" = Uuid, Path, description = "Organization id")),
    responses((status = 200, description = "Workspaces in the organization", body = [Workspace]))
)]
pub(crate) async fn list_workspaces(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(organization_id): Path<Uuid>,
) -> AppResult<Json<Vec<Workspace>>> {
    let sql = format!(
        "SELECT {}, {}, name, created_at, updated_at FROM workspaces WHERE {} ORDER BY created_at DESC",
        case_uuid("id"),
        case_uuid("organization_id"),
        match_uuid_clause("organization_id")
    );

    let rows = sqlx::query(&sql)
        .bind(organization_id.to_string())
        .bind(organization_id.to_string())
        .fetch_all(&state.pool)
        .await?;

    let workspaces = rows.iter().map(workspace_from_row).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(workspaces))
}

#[utoipa::path(
    post,
    path = "/organizations/{organizationId}/workspaces",
    tag = "Workspaces",
    security(("bearerAuth" = [])),
    params(("organizationId" = Uuid, Path, description = "Organization id")),
    request_body = WorkspaceCreateRequest,
    responses((status = 201, description = "Workspace created", body = Workspace))
)]
pub(crate) async fn create_workspace(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(organization_id): Path<Uuid>,
    Json(payload): Json<WorkspaceCreateRequest>,
) -> AppResult<(StatusCode, Json<Workspace>)> {
    ensure_organization_exists(&state.pool, organization_id).await?;

    let now = utc_now();
    let workspace_id = Uuid::new_v4();

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO workspaces (id, organization_id, name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(workspace_id.to_string())
    .bind(organization_id.to_string())
    .bind(&payload.name)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO workspace_members (user_id, workspace_id, role, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(auth.user_id.to_string())
    .bind(workspace_id.to_string())
    .bind(Role::Owner.as_str())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let workspace = Workspace {
        id: workspace_id,
        organization_id,
        name: payload.name,
        created_at: now,
        updated_at: now,
    };

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &workspace,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(workspace)))
}

#[utoipa::path(
    get,
    path = "/workspaces/{workspaceId}",
    tag = "Workspaces",
    security(("bearerAuth" = [])),
    params(("workspaceId" = Uuid, Path, description = "Workspace id")),
    responses((status = 200, description = "Workspace detail", body = Workspace))
)]
pub(crate) async fn get_workspace(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
) -> AppResult<Json<Workspace>> {
    let workspace = fetch_workspace(&state.pool, workspace_id).await?;
    Ok(Json(workspace))
}

#[utoipa::path(
    put,
    path = "/workspaces/{workspaceId}",
    tag = "Workspaces",
    security(("bearerAuth" = [])),
    params(("workspaceId" = Uuid, Path, description = "Workspace id")),
    request_body = WorkspaceUpdateRequest,
    responses((status = 200, description = "Workspace updated", body = Workspace))
)]
pub(crate) async fn update_workspace(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(workspace_id): Path<Uuid>,
    Json(payload): Json<WorkspaceUpdateRequest>,
) -> AppResult<Json<Workspace>> {
    let old = fetch_workspace(&state.pool, workspace_id).await?;
    let mut workspace = old.clone();

    if let Some(name) = payload.name {
        workspace.name = name;
    }
    workspace.updated_at = utc_now();

    let sql = format!(
        "UPDATE workspaces SET name = ?, updated_at = ? WHERE {}",
        match_uuid_clause("id")
    );
    sqlx::query(&sql)
        .bind(&workspace.name)
        .bind(workspace.updated_at)
        .bind(workspace_id.to_string())
        .bind(workspace_id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &workspace,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(workspace))
}

#[utoipa::path(
    delete,
    path = "/workspaces/{workspaceId}",
    tag = "Workspaces",
    security(("bearerAuth" = [])),
    params(("workspaceId" = Uuid, Path, description = "Workspace id")),
    responses((status = 204, description = "Workspace deleted"))
)]
pub(crate) async fn delete_workspace(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(workspace_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let workspace = fetch_workspace(&state.pool, workspace_id).await?;

    let sql = format!("DELETE FROM workspaces WHERE {}", match_uuid_clause("id"));
    sqlx::query(&sql)
        .bind(workspace_id.to_string())
        .bind(workspace_id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &workspace,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/workspaces/{workspaceId}/members",
    tag = "Workspaces",
    security(("bearerAuth" = [])),
    params(("workspaceId" = Uuid, Path, description = "Workspace id")),
    responses((status = 200, description = "Workspace members", body = [MemberView]))
)]
pub(crate) async fn list_members(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(workspace_id): Path<Uuid>,
) -> AppResult<Json<Vec<MemberView>>> {
    let sql = format!(
        "SELECT {}, u.name, u.email, m.role, m.created_at FROM workspace_members m \
         JOIN users u ON u.id = m.user_id \
         WHERE {} ORDER BY m.created_at",
        case_uuid("m.user_id"),
        match_uuid_clause("m.workspace_id")
    );

    let rows = sqlx::query(&sql)
        .bind(workspace_id.to_string())
        .bind(workspace_id.to_string())
        .fetch_all(&state.pool)
        .await?;

    let members = rows.iter().map(member_view_from_row).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(members))
}

#[utoipa::path(
    post,
    path = "/workspaces/{workspaceId}/members",
    tag = "Workspaces",
    security(("bearerAuth" = [])),
    params(("workspaceId" = Uuid, Path, description = "Workspace id")),
    request_body = AddMemberRequest,
    responses((status = 201, description = "Member added", body = WorkspaceMember))
)]
pub(crate) async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(workspace_id): Path<Uuid>,
    Json(payload): Json<AddMemberRequest>,
) -> AppResult<(StatusCode, Json<WorkspaceMember>)> {
    fetch_workspace(&state.pool, workspace_id).await?;
    ensure_user_exists(&state.pool, payload.user_id).await?;

    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM workspace_members WHERE user_id = ? AND workspace_id = ?",
    )
    .bind(payload.user_id.to_string())
    .bind(workspace_id.to_string())
    .fetch_one(&state.pool)
    .await?;
    if existing > 0 {
        return Err(AppError::conflict("user is already a member of this workspace"));
    }

    let now = utc_now();
    sqlx::query(
        "INSERT INTO workspace_members (user_id, workspace_id, role, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(payload.user_id.to_string())
    .bind(workspace_id.to_string())
    .bind(payload.role.as_str())
    .bind(now)
    .execute(&state.pool)
    .await?;

    let member = WorkspaceMember {
        user_id: payload.user_id,
        workspace_id,
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
    path = "/workspaces/{workspaceId}/members/{userId}",
    tag = "Workspaces",
    security(("bearerAuth" = [])),
    params(
        ("workspaceId" = Uuid, Path, description = "Workspace id"),
        ("userId" = Uuid, Path, description = "Member user id")
    ),
    request_body = UpdateMemberRoleRequest,
    responses((status = 200, description = "Member role changed", body = WorkspaceMember))
)]
pub(crate) async fn update_member_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((workspace_id, user_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateMemberRoleRequest>,
) -> AppResult<Json<WorkspaceMember>> {
    let old = fetch_member(&state.pool, workspace_id, user_id).await?;

    sqlx::query("UPDATE workspace_members SET role = ? WHERE user_id = ? AND workspace_id = ?")
        .bind(payload.role.as_str())
        .bind(user_id.to_string())
        .bind(workspace_id.to_string())
        .execute(&state.pool)
        .await?;

    let member = WorkspaceMember { role: payload.role, ..old.clone() };

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
    path = "/workspaces/{workspaceId}/members/{userId}",
    tag = "Workspaces",
    security(("bearerAuth" = [])),
    params(
        ("workspaceId" = Uuid, Path, description = "Workspace id"),
        ("userId" = Uuid, Path, description = "Member user id")
    ),
    responses((status = 204, description = "Member removed"))
)]
pub(crate) async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((workspace_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let member = fetch_member(&state.pool, workspace_id, user_id).await?;

    sqlx::query("DELETE FROM workspace_members WHERE user_id = ? AND workspace_id = ?")
        .bind(user_id.to_string())
        .bind(workspace_id.to_string())
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

pub(crate) async fn fetch_workspace(pool: &SqlitePool, workspace_id: Uuid) -> AppResult<Workspace> {
    let sql = format!(
        "SELECT {}, {}, name, created_at, updated_at FROM workspaces WHERE {}",
        case_uuid("id"),
        case_uuid("organization_id"),
        match_uuid_clause("id")
    );

    let row = sqlx::query(&sql)
        .bind(workspace_id.to_string())
        .bind(workspace_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("workspace not found"))?;

    workspace_from_row(&row)
}

async fn fetch_member(
    pool: &SqlitePool,
    workspace_id: Uuid,
    user_id: Uuid,
) -> AppResult<WorkspaceMember> {
    let row = sqlx::query(
        "SELECT role, created_at FROM workspace_members WHERE user_id = ? AND workspace_id = ?",
    )
    .bind(user_id.to_string())
    .bind(workspace_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("membership not found"))?;

    let role: String = row.get("role");
    let role = Role::parse(&role)
        .ok_or_else(|| AppError::internal(format!("unknown role: {role}")))?;

    Ok(WorkspaceMember {
        user_id,
        workspace_id,
        role,
        created_at: row.get("created_at"),
    })
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

async fn ensure_organization_exists(pool: &SqlitePool, organization_id: Uuid) -> AppResult<()> {
    let sql = format!(
        "SELECT COUNT(1) FROM organizations WHERE {}",
        match_uuid_clause("id")
    );
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(organization_id.to_string())
        .bind(organization_id.to_string())
        .fetch_one(pool)
        .await?;

    if count == 0 {
        return Err(AppError::not_found("organization not found"));
    }

    Ok(())
}
