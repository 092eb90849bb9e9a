use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::db::row_parsers::task_from_row;
use crate::db::uuid_sql::{case_uuid, match_uuid_clause};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::task::{Task, TaskCreateRequest, TaskUpdateRequest};
use crate::utils::utc_now;

const DEFAULT_STATUS: &str = "todo";

const TASK_COLUMNS_TAIL: &str = "title, description, status, due_date, created_at, updated_at, deleted_at";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects/:projectId/tasks", get(list_tasks).post(create_task))
        .route(
            "/projects/:projectId/tasks/:taskId",
            get(get_task).put(update_task).delete(delete_task),
        )
}

fn task_select(where_clause: &str) -> String {
    format!(
        "SELECT {}, {}, {}, {}, {} FROM tasks WHERE {}",
        case_uuid("id"),
        case_uuid("project_id"),
        case_uuid("assignee_id"),
        case_uuid("reporter_id"),
        TASK_COLUMNS_TAIL,
        where_clause
    )
}

#[utoipa::path(
    get,
    path = "/projects/{projectId}/tasks",
    tag = "Tasks",
    security(("bearerAuth" = [])),
    params(("projectId" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Tasks in the project", body = [Task]))
)]
pub(crate) async fn list_tasks(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<Task>>> {
    let sql = task_select(&format!(
        "{} AND deleted_at IS NULL ORDER BY created_at",
        match_uuid_clause("project_id")
    ));

    let rows = sqlx::query(&sql)
        .bind(project_id.to_string())
        .bind(project_id.to_string())
        .fetch_all(&state.pool)
        .await?;

    let tasks = rows.iter().map(task_from_row).collect::<Result<Vec<_>, _>>()?;
    Ok(Json(tasks))
}

#[utoipa::path(
    post,
    path = "/projects/{projectId}/tasks",
    tag = "Tasks",
    security(("bearerAuth" = [])),
    params(("projectId" = Uuid, Path, description = "Project id")),
    request_body = TaskCreateRequest,
    responses((status = 201, description = "Task created", body = Task))
)]
pub(crate) async fn create_task(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<TaskCreateRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    super::projects::fetch_project(&state.pool, project_id).await?;

    let now = utc_now();
    let task_id = Uuid::new_v4();
    let status = payload.status.unwrap_or_else(|| DEFAULT_STATUS.to_string());

    sqlx::query(
        "INSERT INTO tasks (id, project_id, title, description, status, assignee_id, reporter_id, due_date, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(task_id.to_string())
    .bind(project_id.to_string())
    .bind(&payload.title)
    .bind(&payload.description)
    .bind(&status)
    .bind(payload.assignee_id.map(|u| u.to_string()))
    .bind(auth.user_id.to_string())
    .bind(payload.due_date)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let task = Task {
        id: task_id,
        project_id,
        title: payload.title,
        description: payload.description,
        status,
        assignee_id: payload.assignee_id,
        reporter_id: Some(auth.user_id),
        due_date: payload.due_date,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.user_id),
        &task,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    get,
    path = "/projects/{projectId}/tasks/{taskId}",
    tag = "Tasks",
    security(("bearerAuth" = [])),
    params(
        ("projectId" = Uuid, Path, description = "Project id"),
        ("taskId" = Uuid, Path, description = "Task id")
    ),
    responses((status = 200, description = "Task detail", body = Task))
)]
pub(crate) async fn get_task(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Task>> {
    let task = fetch_task(&state.pool, project_id, task_id).await?;
    Ok(Json(task))
}

#[utoipa::path(
    put,
    path = "/projects/{projectId}/tasks/{taskId}",
    tag = "Tasks",
    security(("bearerAuth" = [])),
    params(
        ("projectId" = Uuid, Path, description = "Project id"),
        ("taskId" = Uuid, Path, description = "Task id")
    ),
    request_body = TaskUpdateRequest,
    responses((status = 200, description = "Task updated", body = Task))
)]
pub(crate) async fn update_task(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<TaskUpdateRequest>,
) -> AppResult<Json<Task>> {
    let old = fetch_task(&state.pool, project_id, task_id).await?;
    let mut task = old.clone();

    if let Some(title) = payload.title {
        task.title = title;
    }
    if payload.description.is_some() {
        task.description = payload.description;
    }
    if let Some(status) = payload.status {
        task.status = status;
    }
    if payload.assignee_id.is_some() {
        task.assignee_id = payload.assignee_id;
    }
    if payload.due_date.is_some() {
        task.due_date = payload.due_date;
    }
    task.updated_at = utc_now();

    let sql = format!(
        "UPDATE tasks SET title = ?, description = ?, status = ?, assignee_id = ?, due_date = ?, updated_at = ? WHERE {}",
        match_uuid_clause("id")
    );
    sqlx::query(&sql)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.status)
        .bind(task.assignee_id.map(|u| u.to_string()))
        .bind(task.due_date)
        .bind(task.updated_at)
        .bind(task_id.to_string())
        .bind(task_id.to_string())
        .execute(&state.pool)
        .await?;

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &task,
        Some(&old),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(task))
}

#[utoipa::path(
    delete,
    path = "/projects/{projectId}/tasks/{taskId}",
    tag = "Tasks",
    security(("bearerAuth" = [])),
    params(
        ("projectId" = Uuid, Path, description = "Project id"),
        ("taskId" = Uuid, Path, description = "Task id")
    ),
    responses((status = 204, description = "Task soft deleted"))
)]
pub(crate) async fn delete_task(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let task = fetch_task(&state.pool, project_id, task_id).await?;

    let now = utc_now();
    let sql = format!(
        "UPDATE tasks SET deleted_at = ?, updated_at = ? WHERE {} AND deleted_at IS NULL",
        match_uuid_clause("id")
    );
    let affected = sqlx::query(&sql)
        .bind(now)
        .bind(now)
        .bind(task_id.to_string())
        .bind(task_id.to_string())
        .execute(&state.pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("task not found"));
    }

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(auth.user_id),
        &task,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_task(pool: &SqlitePool, project_id: Uuid, task_id: Uuid) -> AppResult<Task> {
    let sql = task_select(&format!(
        "{} AND {} AND deleted_at IS NULL",
        match_uuid_clause("id"),
        match_uuid_clause("project_id")
    ));

    let row = sqlx::query(&sql)
        .bind(task_id.to_string())
        .bind(task_id.to_string())
        .bind(project_id.to_string())
        .bind(project_id.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("task not found"))?;

    task_from_row(&row)
}
