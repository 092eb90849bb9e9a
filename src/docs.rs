use axum::Router;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::auth::logout,
        routes::organizations::list_organizations,
        routes::organizations::create_organization,
        routes::organizations::get_organization,
        routes::organizations::update_organization,
        routes::organizations::delete_organization,
        routes::organizations::list_members,
        routes::organizations::add_member,
        routes::organizations::update_member_role,
        routes::organizations::remove_member,
        routes::workspaces::list_workspaces,
        routes::workspaces::create_workspace,
        routes::workspaces::get_workspace,
        routes::workspaces::update_workspace,
        routes::workspaces::delete_workspace,
        routes::workspaces::list_members,
        routes::workspaces::add_member,
        routes::workspaces::update_member_role,
        routes::workspaces::remove_member,
        routes::projects::list_projects,
        routes::projects::create_project,
        routes::projects::get_project,
        routes::projects::get_project_by_slug,
        routes::projects::update_project,
        routes::projects::delete_project,
        routes::projects::list_members,
        routes::projects::add_member,
        routes::projects::update_member_role,
        routes::projects::remove_member,
        routes::tasks::list_tasks,
        routes::tasks::create_task,
        routes::tasks::get_task,
        routes::tasks::update_task,
        routes::tasks::delete_task,
        routes::analytics::overview,
        routes::search::search,
    ),
    components(
        schemas(
            crate::authz::Role,
            crate::authz::GlobalRole,
            models::user::User,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::RegisterRequest,
            models::organization::Organization,
            models::organization::OrganizationCreateRequest,
            models::organization::OrganizationUpdateRequest,
            models::workspace::Workspace,
            models::workspace::WorkspaceCreateRequest,
            models::workspace::WorkspaceUpdateRequest,
            models::project::Project,
            models::project::ProjectCreateRequest,
            models::project::ProjectUpdateRequest,
            models::project::Visibility,
            models::task::Task,
            models::task::TaskCreateRequest,
            models::task::TaskUpdateRequest,
            models::membership::OrganizationMember,
            models::membership::WorkspaceMember,
            models::membership::ProjectMember,
            models::membership::MemberView,
            models::membership::AddMemberRequest,
            models::membership::UpdateMemberRoleRequest,
            routes::analytics::AnalyticsOverview,
            routes::analytics::StatusCount,
            routes::analytics::ViewScope,
            routes::search::SearchResults,
            routes::search::ProjectHit,
            routes::search::TaskHit,
            routes::health::HealthResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Organizations", description = "Organization management and membership"),
        (name = "Workspaces", description = "Workspace management and membership"),
        (name = "Projects", description = "Project management and membership"),
        (name = "Tasks", description = "Task management"),
        (name = "Analytics", description = "Aggregated views, organization-wide or self-scoped"),
        (name = "Search", description = "Universal search within an organization"),
        (name = "Health", description = "Liveness probe")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_routes() -> Router {
    Router::new().merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
