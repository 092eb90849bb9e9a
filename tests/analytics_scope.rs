//! Analytics and search pick between the organization-wide and the
//! self-scoped view based on the elevated-access predicate.

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt;
use trellis::create_app;

async fn setup() -> Result<(Router, TempDir)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test_analytics.db");
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool).await?;
    Ok((app, dir))
}

async fn body_json(resp: Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn register(app: &Router, name: &str, email: &str) -> Result<(String, String)> {
    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"name": name, "email": email, "password": "password123"}).to_string(),
        ))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_json(resp).await?;
    Ok((
        body["token"].as_str().context("token")?.to_string(),
        body["user"]["id"].as_str().context("user id")?.to_string(),
    ))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: &str,
    body: Option<Value>,
) -> Result<Response> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"));
    let req = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            builder.body(Body::from(value.to_string()))?
        }
        None => builder.body(Body::empty())?,
    };
    Ok(app.clone().oneshot(req).await?)
}

/// Owner builds an org with one project and three tasks; exactly one task
/// is assigned to the plain member. Returns (org id, member token).
async fn seed_org(app: &Router) -> Result<(String, String)> {
    let (owner, _) = register(app, "Manager Mel", "mel@example.com").await?;
    let (member, member_id) = register(app, "Worker Wes", "wes@example.com").await?;

    let resp = send(app, "POST", "/organizations", &owner, Some(json!({"name": "Acme"}))).await?;
    let org_id = body_json(resp).await?["id"].as_str().context("org id")?.to_string();

    let resp = send(
        app,
        "POST",
        &format!("/organizations/{org_id}/members"),
        &owner,
        Some(json!({"user_id": member_id, "role": "member"})),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = send(
        app,
        "POST",
        &format!("/organizations/{org_id}/workspaces"),
        &owner,
        Some(json!({"name": "Delivery"})),
    )
    .await?;
    let workspace_id = body_json(resp).await?["id"].as_str().context("ws id")?.to_string();

    let resp = send(
        app,
        "POST",
        "/projects",
        &owner,
        Some(json!({
            "workspaceId": workspace_id,
            "name": "Rollout",
            "slug": "rollout",
            "visibility": "private"
        })),
    )
    .await?;
    let project_id = body_json(resp).await?["id"].as_str().context("project id")?.to_string();

    for (title, assignee) in [
        ("Draft rollout checklist", None),
        ("Review rollout risks", None),
        ("Ship rollout announcement", Some(member_id.clone())),
    ] {
        let mut task = json!({"title": title});
        if let Some(assignee) = assignee {
            task["assignee_id"] = json!(assignee);
        }
        let resp = send(
            app,
            "POST",
            &format!("/projects/{project_id}/tasks"),
            &owner,
            Some(task),
        )
        .await?;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    // Owner's overview sees everything.
    let resp = send(
        app,
        "GET",
        &format!("/organizations/{org_id}/analytics/overview"),
        &owner,
        None,
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let overview = body_json(resp).await?;
    assert_eq!(overview["view"], "organization");
    assert_eq!(overview["project_count"], 1);
    assert_eq!(overview["task_count"], 3);

    Ok((org_id, member))
}

#[tokio::test]
async fn plain_members_get_the_self_scoped_view() -> Result<()> {
    let (app, _dir) = setup().await?;
    let (org_id, member) = seed_org(&app).await?;

    let resp = send(
        &app,
        "GET",
        &format!("/organizations/{org_id}/analytics/overview"),
        &member,
        None,
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let overview = body_json(resp).await?;
    assert_eq!(overview["view"], "self");
    // Only the task assigned to them; they are a member of no project.
    assert_eq!(overview["task_count"], 1);
    assert_eq!(overview["project_count"], 0);

    Ok(())
}

#[tokio::test]
async fn search_follows_the_same_split() -> Result<()> {
    let (app, _dir) = setup().await?;
    let (org_id, member) = seed_org(&app).await?;

    let resp = send(
        &app,
        "GET",
        &format!("/organizations/{org_id}/search?q=rollout"),
        &member,
        None,
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let results = body_json(resp).await?;
    assert_eq!(results["view"], "self");
    assert_eq!(results["projects"].as_array().map(Vec::len), Some(0));
    // "rollout" appears in every task title; the self scope narrows the
    // hits to the one assigned task.
    assert_eq!(results["tasks"].as_array().map(Vec::len), Some(1));

    Ok(())
}
