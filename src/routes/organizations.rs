//! Organization CRUD and member administration.
//!
//! Role checks happen in the request-pipeline guard before these handlers
//! run; handlers only implement the data access. Membership mutations are
//! logged at Critical severity.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Role;
use crate::db::row_parsers::{member_view_from_row, organization_from_row};
use crate::db::uuid_sql::{case_uuid, match_uuid_clause};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::membership::{AddMemberRequest, MemberView, OrganizationMember, UpdateMemberRoleRequest};
use crate::models::organization::{Organization, OrganizationCreateRequest, OrganizationUpdateRequest};
use crate::utils::utc_now;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/organizations", get(list_organizations).post(create_organization))
        .route(
            "/organizations/:organizationId",
            get(get_organization).put(update_organization).delete(delete_organization),
        )
        .route(
            "/organizations/:organizationId/members",
            get(list_members).post(add_member),
        )
        .route(
            "/organizations/:organizationId/members/:userId",
            put(update_member_role).delete(remove_member),
        )
}

#[utoipa::path(
    get,
    path = "/organizations",
    tag = "Organizations",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Organizations the caller belongs to", body = [Organization]))
)]
pub(crate) async fn list_organizations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Organization>>> {
    let sql = format!(
        "SELECT {}, o.name, {}, o.created_at, o.updated_at FROM organizations o \
         JOIN organization_members m ON m.organization_id = o.id \
         WHERE m.user_id = ? ORDER BY o.created_at DESC",
        case_uuid("o.id"),
        case_uuid("o.owner_id")
    );

    let rows = sqlx::query(&sql)
        .bind(auth.user_id.to_string())
        .fetch_all(&state.pool)
        .await?;

    let organizations = rows
        .iter()
        .map(organization_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(organizations))
}

#[utoipa::path(
    post,
    path = "/organizations",
    tag = "Organizations",
    security(("bearerAuth" = [])),
    request_body = OrganizationCreateRequest,
    responses((status = 201, description = "Organization created", body = Organization))
)]
pub(crate) async fn create_organization(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<OrganizationCreateRequest>,
) -> AppResult<(StatusCode, Json<Organization>)> {
    let now = utc_now();
    let organization_id = Uuid::new_v4();

    // The creator becomes the organization owner, both as the owner_id
    // column and as an explicit top-role membership.
    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO organizations (id, name, owner_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(organization_id.to_string())
    .bind(&payload.name)
    .bind(auth.user_id.to_string())
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO organization_members (user_id, organization_id, role, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(auth.user_id.to_string())
    .bind(organization_id.to_string())
    .bind(Role::Owner.as_str())
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let organization = Organization {
        id: organization_id,
        name: payload.name,
        owner_id: auth.user_id,
        created_at: now,
        updated_at: now,
    };

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &organization,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(organization)))
}

#[utoipa::path(
    get,
    path = "/organizations/{organizationId}",
    tag = "Organizations",
    security(("bearerAuth" = [])),
    params(("organizationId" = Uuid, Path, description = "Organization id")),
    responses((status = 200, description = "Organization detail", body = Organization))
)]
pub(crate) async fn get_organization(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(organization_id): Path<Uuid>,
) -> AppResult<Json<Organization>> {
    let organization = fetch_organization(&state.pool, organization_id).await?;
    Ok(Json(organization))
}

#[utoipa::path(
    put,
    path = "/organizations/{organizationId}",
    tag = "Organizations",
    security(("bearerAuth" = [])),
    params(("organizationId" = Uuid, Path, description = "Organization id")),
    request_body = OrganizationUpdateRequest,
    responses((status = 200, description = "Organization updated", body = Organization))
)]
pub(crate) async fn update_organization(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(organization_id): Path<Uuid>,
    Json(payload): Json<OrganizationUpdateRequest>,
) -> AppResult<Json<Organization>> {
    let old = fetch_organization(&state.pool, organization_id).await?;
    let mut organization = old.clone();

    if let Some(name) = payload.name {
        organization.name = name;
    }
    organization.updated_at = utc_now();

    let sql = format!(
        "UPDATE organizations SET name = ?, updated_at = ? WHERE {}",
        match_uuid_clause("id")
    );
    sqlx::query(&sql)
        .bind(&organization.name)
        .bind(organization.updated_at)
        .bind(organization_id.to_string())
        .bind(organization_id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &organization,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(organization))
}

#[utoipa::path(
    delete,
    path = "/organizations/{organizationId}",
    tag = "Organizations",
    security(("bearerAuth" = [])),
    params(("organizationId" = Uuid, Path, description = "Organization id")),
    responses((status = 204, description = "Organization deleted"))
)]
pub(crate) async fn delete_organization(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(organization_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let organization = fetch_organization(&state.pool, organization_id).await?;

    // Hard delete; workspaces, projects, tasks and memberships go with the
    // organization via foreign-key cascade.
    let sql = format!("DELETE FROM organizations WHERE {}", match_uuid_clause("id"));
    sqlx::query(&sql)
        .bind(organization_id.to_string())
        .bind(organization_id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &organization,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/organizations/{organizationId}/members",
    tag = "Organizations",
    security(("bearerAuth" = [])),
    params(("organizationId" = Uuid, Path, description = "Organization id")),
    responses((status = 200, description = "Organization members", body = [MemberView]))
)]
pub(crate) async fn list_members(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(organization_id): Path<Uuid>,
) -> AppResult<Json<Vec<MemberView>>> {
    let sql = format!(
        "SELECT {}, u.name, u.email, m.role, m.created_at FROM organization_members m \
         JOIN users u ON u.id = m.user_id \
         WHERE {} ORDER BY m.created_at",
        case_uuid("m.user_id"),
        match_uuid_clause("m.organization_id")
    );

    let rows = sqlx::query(&sql)
        .bind(organization_id.to_string())
        .bind(organization_id.to_string())
        .fetch_all(&state.pool)
        .await?;

    let members = rows
        .iter()
        .map(member_view_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(members))
}

#[utoipa::path(
    post,
    path = "/organizations/{organizationId}/members",
    tag = "Organizations",
    security(("bearerAuth" = [])),
    params(("organizationId" = Uuid, Path, description = "Organization id")),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Member added", body = OrganizationMember),
        (status = 409, description = "User is already a member")
    )
)]
pub(crate) async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(organization_id): Path<Uuid>,
    Json(payload): Json<AddMemberRequest>,
) -> AppResult<(StatusCode, Json<OrganizationMember>)> {
    fetch_organization(&state.pool, organization_id).await?;
    ensure_user_exists(&state.pool, payload.user_id).await?;

    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM organization_members WHERE user_id = ? AND organization_id = ?",
    )
    .bind(payload.user_id.to_string())
    .bind(organization_id.to_string())
    .fetch_one(&state.pool)
    .await?;
    if existing > 0 {
        return Err(AppError::conflict("user is already a member of this organization"));
    }

    let now = utc_now();
    sqlx::query(
        "INSERT INTO organization_members (user_id, organization_id, role, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(payload.user_id.to_string())
    .bind(organization_id.to_string())
    .bind(payload.role.as_str())
    .bind(now)
    .execute(&state.pool)
    .await?;

    let member = OrganizationMember {
        user_id: payload.user_id,
        organization_id,
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
    path = "/organizations/{organizationId}/members/{userId}",
    tag = "Organizations",
    security(("bearerAuth" = [])),
    params(
        ("organizationId" = Uuid, Path, description = "Organization id"),
        ("userId" = Uuid, Path, description = "Member user id")
    ),
    request_body = UpdateMemberRoleRequest,
    responses((status = 200, description = "Member role changed", body = OrganizationMember))
)]
pub(crate) async fn update_member_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((organization_id, user_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateMemberRoleRequest>,
) -> AppResult<Json<OrganizationMember>> {
    let organization = fetch_organization(&state.pool, organization_id).await?;
    if organization.owner_id == user_id && payload.role != Role::Owner {
        return Err(AppError::conflict("the organization owner cannot be demoted"));
    }

    let old = fetch_member(&state.pool, organization_id, user_id).await?;

    sqlx::query("UPDATE organization_members SET role = ? WHERE user_id = ? AND organization_id = ?")
        .bind(payload.role.as_str())
        .bind(user_id.to_string())
        .bind(organization_id.to_string())
        .execute(&state.pool)
        .await?;

    let member = OrganizationMember { role: payload.role, ..old.clone() };

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
    path = "/organizations/{organizationId}/members/{userId}",
    tag = "Organizations",
    security(("bearerAuth" = [])),
    params(
        ("organizationId" = Uuid, Path, description = "Organization id"),
        ("userId" = Uuid, Path, description = "Member user id")
    ),
    responses((status = 204, description = "Member removed"))
)]
pub(crate) async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((organization_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let organization = fetch_organization(&state.pool, organization_id).await?;
    if organization.owner_id == user_id {
        return Err(AppError::conflict("the organization owner cannot be removed"));
    }

    let member = fetch_member(&state.pool, organization_id, user_id).await?;

    sqlx::query("DELETE FROM organization_members WHERE user_id = ? AND organization_id = ?")
        .bind(user_id.to_string())
        .bind(organization_id.to_string())
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

async fn fetch_organization(pool: &SqlitePool, organization_id: Uuid) -> AppResult<Organization> {
    let sql = format!(
        "SELECT {}, name, {}, created_at, updated_at FROM organizations WHERE {}",
        case_uuid("id"),
        case_uuid("owner_id"),
        match_uuid_clause("id")
    );

    let row = sqlx::query(&sql)
        .bind(organization_id.to_string())
        .bind(organization_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("organization not found"))?;

    organization_from_row(&row)
}

async fn fetch_member(
    pool: &SqlitePool,
    organization_id: Uuid,
    user_id: Uuid,
) -> AppResult<OrganizationMember> {
    let row = sqlx::query(
        "SELECT role, created_at FROM organization_members WHERE user_id = ? AND organization_id = ?",
    )
    .bind(user_id.to_string())
    .bind(organization_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("membership not found"))?;

    use sqlx::Row;
    let role: String = row.get("role");
    let role = Role::parse(&role)
        .ok_or_else(|| AppError::internal(format!("unknown role: {role}")))?;

    Ok(OrganizationMember {
        user_id,
        organization_id,
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
