//! Membership administration across the three scope kinds: add, role
//! change, removal, duplicates, and the owner-protection rules.

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
    let db_path = dir.path().join("test_members.db");
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

#[tokio::test]
async fn organization_member_lifecycle() -> Result<()> {
    let (app, _dir) = setup().await?;

    let (owner, _owner_id) = register(&app, "Owner", "owner@example.com").await?;
    let (member, member_id) = register(&app, "Member", "member@example.com").await?;

    let resp = send(&app, "POST", "/organizations", &owner, Some(json!({"name": "Acme"}))).await?;
    let org_id = body_json(resp).await?["id"].as_str().context("org id")?.to_string();

    // Creator shows up as the sole owner-role member.
    let resp = send(&app, "GET", &format!("/organizations/{org_id}/members"), &owner, None).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let members = body_json(resp).await?;
    assert_eq!(members.as_array().map(Vec::len), Some(1));
    assert_eq!(members[0]["role"], "owner");

    // Add, then add again.
    let resp = send(
        &app,
        "POST",
        &format!("/organizations/{org_id}/members"),
        &owner,
        Some(json!({"user_id": member_id, "role": "viewer"})),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = send(
        &app,
        "POST",
        &format!("/organizations/{org_id}/members"),
        &owner,
        Some(json!({"user_id": member_id, "role": "viewer"})),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // Unknown users cannot be added.
    let resp = send(
        &app,
        "POST",
        &format!("/organizations/{org_id}/members"),
        &owner,
        Some(json!({"user_id": "7f000000-0000-0000-0000-00000000dead", "role": "viewer"})),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Roles outside the closed set are rejected at deserialization.
    let resp = send(
        &app,
        "POST",
        &format!("/organizations/{org_id}/members"),
        &owner,
        Some(json!({"user_id": member_id, "role": "admin"})),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // A viewer cannot administer members.
    let resp = send(
        &app,
        "POST",
        &format!("/organizations/{org_id}/members"),
        &member,
        Some(json!({"user_id": member_id, "role": "owner"})),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Role change, then removal; access disappears with the row.
    let resp = send(
        &app,
        "PUT",
        &format!("/organizations/{org_id}/members/{member_id}"),
        &owner,
        Some(json!({"role": "manager"})),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await?["role"], "manager");

    let resp = send(
        &app,
        "DELETE",
        &format!("/organizations/{org_id}/members/{member_id}"),
        &owner,
        None,
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = send(&app, "GET", &format!("/organizations/{org_id}"), &member, None).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn organization_owner_cannot_be_demoted_or_removed() -> Result<()> {
    let (app, _dir) = setup().await?;

    let (owner, owner_id) = register(&app, "Owner", "owner2@example.com").await?;

    let resp = send(&app, "POST", "/organizations", &owner, Some(json!({"name": "Globex"}))).await?;
    let org_id = body_json(resp).await?["id"].as_str().context("org id")?.to_string();

    let resp = send(
        &app,
        "PUT",
        &format!("/organizations/{org_id}/members/{owner_id}"),
        &owner,
        Some(json!({"role": "viewer"})),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = send(
        &app,
        "DELETE",
        &format!("/organizations/{org_id}/members/{owner_id}"),
        &owner,
        None,
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn workspace_and_project_memberships_are_independent_scopes() -> Result<()> {
    let (app, _dir) = setup().await?;

    let (owner, _) = register(&app, "Owner", "owner3@example.com").await?;
    let (helper, helper_id) = register(&app, "Helper", "helper@example.com").await?;

    let resp = send(&app, "POST", "/organizations", &owner, Some(json!({"name": "Initech"}))).await?;
    let org_id = body_json(resp).await?["id"].as_str().context("org id")?.to_string();

    let resp = send(
        &app,
        "POST",
        &format!("/organizations/{org_id}/workspaces"),
        &owner,
        Some(json!({"name": "Core"})),
    )
    .await?;
    let workspace_id = body_json(resp).await?["id"].as_str().context("ws id")?.to_string();

    let resp = send(
        &app,
        "POST",
        "/projects",
        &owner,
        Some(json!({
            "workspaceId": workspace_id,
            "name": "Migration",
            "slug": "migration",
            "visibility": "private"
        })),
    )
    .await?;
    let project_id = body_json(resp).await?["id"].as_str().context("project id")?.to_string();

    // Workspace membership does not grant project access by itself.
    let resp = send(
        &app,
        "POST",
        &format!("/workspaces/{workspace_id}/members"),
        &owner,
        Some(json!({"user_id": helper_id, "role": "member"})),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = send(&app, "GET", &format!("/workspaces/{workspace_id}"), &helper, None).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&app, "GET", &format!("/projects/{project_id}"), &helper, None).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Project membership opens the project but grants nothing broader.
    let resp = send(
        &app,
        "POST",
        &format!("/projects/{project_id}/members"),
        &owner,
        Some(json!({"user_id": helper_id, "role": "viewer"})),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = send(&app, "GET", &format!("/projects/{project_id}"), &helper, None).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&app, "GET", &format!("/organizations/{org_id}"), &helper, None).await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    Ok(())
}
