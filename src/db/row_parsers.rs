//! Manual row mapping for entities whose id columns may hold text or blob
//! uuids. Queries project ids through `uuid_sql::case_uuid`, so every id
//! arrives here as canonical text.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::authz::Role;
use crate::errors::AppError;
use crate::models::membership::MemberView;
use crate::models::organization::Organization;
use crate::models::project::{Project, Visibility};
use crate::models::task::Task;
use crate::models::user::DbUser;
use crate::models::workspace::Workspace;

fn get_uuid(row: &SqliteRow, column: &str) -> Result<Uuid, AppError> {
    let value: String = row
        .try_get(column)
        .map_err(|e| AppError::internal(format!("missing {column}: {e}")))?;
    Uuid::parse_str(&value).map_err(|e| AppError::internal(format!("invalid uuid in {column}: {e}")))
}

fn get_opt_uuid(row: &SqliteRow, column: &str) -> Result<Option<Uuid>, AppError> {
    let value: Option<String> = row
        .try_get(column)
        .map_err(|e| AppError::internal(format!("missing {column}: {e}")))?;
    value
        .map(|s| {
            Uuid::parse_str(&s)
                .map_err(|e| AppError::internal(format!("invalid uuid in {column}: {e}")))
        })
        .transpose()
}

fn get_datetime(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, AppError> {
    row.try_get(column)
        .map_err(|e| AppError::internal(format!("missing {column}: {e}")))
}

pub fn db_user_from_row(row: &SqliteRow) -> Result<DbUser, AppError> {
    let global_role: String = row
        .try_get("global_role")
        .map_err(|e| AppError::internal(format!("missing global_role: {e}")))?;
    let global_role = crate::authz::GlobalRole::parse(&global_role)
        .ok_or_else(|| AppError::internal(format!("unknown global role: {global_role}")))?;

    Ok(DbUser {
        id: get_uuid(row, "id")?,
        name: row.try_get("name").map_err(|e| AppError::internal(format!("missing name: {e}")))?,
        email: row.try_get("email").map_err(|e| AppError::internal(format!("missing email: {e}")))?,
        password_hash: row
            .try_get("password_hash")
            .map_err(|e| AppError::internal(format!("missing password_hash: {e}")))?,
        global_role,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
        deleted_at: row
            .try_get("deleted_at")
            .map_err(|e| AppError::internal(format!("missing deleted_at: {e}")))?,
    })
}

pub fn organization_from_row(row: &SqliteRow) -> Result<Organization, AppError> {
    Ok(Organization {
        id: get_uuid(row, "id")?,
        name: row.try_get("name").map_err(|e| AppError::internal(format!("missing name: {e}")))?,
        owner_id: get_uuid(row, "owner_id")?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
    })
}

pub fn workspace_from_row(row: &SqliteRow) -> Result<Workspace, AppError> {
    Ok(Workspace {
        id: get_uuid(row, "id")?,
        organization_id: get_uuid(row, "organization_id")?,
        name: row.try_get("name").map_err(|e| AppError::internal(format!("missing name: {e}")))?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
    })
}

pub fn project_from_row(row: &SqliteRow) -> Result<Project, AppError> {
    let visibility: String = row
        .try_get("visibility")
        .map_err(|e| AppError::internal(format!("missing visibility: {e}")))?;
    let visibility = Visibility::parse(&visibility)
        .ok_or_else(|| AppError::internal(format!("unknown visibility: {visibility}")))?;

    Ok(Project {
        id: get_uuid(row, "id")?,
        workspace_id: get_uuid(row, "workspace_id")?,
        name: row.try_get("name").map_err(|e| AppError::internal(format!("missing name: {e}")))?,
        slug: row.try_get("slug").map_err(|e| AppError::internal(format!("missing slug: {e}")))?,
        visibility,
        created_by: get_uuid(row, "created_by")?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
    })
}

pub fn task_from_row(row: &SqliteRow) -> Result<Task, AppError> {
    Ok(Task {
        id: get_uuid(row, "id")?,
        project_id: get_uuid(row, "project_id")?,
        title: row.try_get("title").map_err(|e| AppError::internal(format!("missing title: {e}")))?,
        description: row
            .try_get("description")
            .map_err(|e| AppError::internal(format!("missing description: {e}")))?,
        status: row
            .try_get("status")
            .map_err(|e| AppError::internal(format!("missing status: {e}")))?,
        assignee_id: get_opt_uuid(row, "assignee_id")?,
        reporter_id: get_opt_uuid(row, "reporter_id")?,
        due_date: row
            .try_get("due_date")
            .map_err(|e| AppError::internal(format!("missing due_date: {e}")))?,
        created_at: get_datetime(row, "created_at")?,
        updated_at: get_datetime(row, "updated_at")?,
        deleted_at: row
            .try_get("deleted_at")
            .map_err(|e| AppError::internal(format!("missing deleted_at: {e}")))?,
    })
}

pub fn member_view_from_row(row: &SqliteRow) -> Result<MemberView, AppError> {
    let role: String = row
        .try_get("role")
        .map_err(|e| AppError::internal(format!("missing role: {e}")))?;
    let role = Role::parse(&role)
        .ok_or_else(|| AppError::internal(format!("unknown role: {role}")))?;

    Ok(MemberView {
        user_id: get_uuid(row, "user_id")?,
        name: row.try_get("name").map_err(|e| AppError::internal(format!("missing name: {e}")))?,
        email: row.try_get("email").map_err(|e| AppError::internal(format!("missing email: {e}")))?,
        role,
        created_at: get_datetime(row, "created_at")?,
    })
}
