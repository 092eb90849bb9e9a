use std::collections::HashMap;

use super::role::Role;
use super::scope::{ScopeKind, ScopeSelector};

/// Per-operation access requirements: the role floors that satisfy the
/// check, and (optionally) an explicit scope selector that overrides
/// parameter-name inference. An empty role set means the operation only
/// requires an authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct OperationPolicy {
    pub required_roles: &'static [Role],
    pub scope: Option<ScopeSelector>,
}

impl OperationPolicy {
    pub const fn roles(required_roles: &'static [Role]) -> Self {
        Self { required_roles, scope: None }
    }

    pub const fn scoped(required_roles: &'static [Role], scope: ScopeSelector) -> Self {
        Self { required_roles, scope: Some(scope) }
    }
}

const AUTHENTICATED: &[Role] = &[];
const VIEWER: &[Role] = &[Role::Viewer];
const MEMBER: &[Role] = &[Role::Member];
const MANAGER: &[Role] = &[Role::Manager];
const OWNER: &[Role] = &[Role::Owner];
const MANAGER_OR_OWNER: &[Role] = &[Role::Manager, Role::Owner];

/// The statically constructed operation table, keyed by `METHOD` plus the
/// route pattern as registered with the router. Built once at startup and
/// only read afterwards. Routes absent from the table are not guarded at
/// all (health, register, login).
pub struct PolicyRegistry {
    policies: HashMap<&'static str, OperationPolicy>,
}

impl PolicyRegistry {
    pub fn standard() -> Self {
        let mut policies: HashMap<&'static str, OperationPolicy> = HashMap::new();
        let mut declare = |key: &'static str, policy: OperationPolicy| {
            policies.insert(key, policy);
        };

        // Organizations. Everything below the collection routes carries an
        // `organizationId` path param, so scope inference applies.
        declare("GET /organizations", OperationPolicy::roles(AUTHENTICATED));
        declare("POST /organizations", OperationPolicy::roles(AUTHENTICATED));
        declare("GET /organizations/:organizationId", OperationPolicy::roles(VIEWER));
        declare("PUT /organizations/:organizationId", OperationPolicy::roles(MANAGER));
        declare("DELETE /organizations/:organizationId", OperationPolicy::roles(OWNER));
        declare("GET /organizations/:organizationId/members", OperationPolicy::roles(VIEWER));
        declare("POST /organizations/:organizationId/members", OperationPolicy::roles(MANAGER_OR_OWNER));
        declare("PUT /organizations/:organizationId/members/:userId", OperationPolicy::roles(MANAGER_OR_OWNER));
        declare("DELETE /organizations/:organizationId/members/:userId", OperationPolicy::roles(MANAGER_OR_OWNER));

        // Workspaces. Creation and listing are organization-scoped; the
        // rest is workspace-scoped, all by inference.
        declare("GET /organizations/:organizationId/workspaces", OperationPolicy::roles(VIEWER));
        declare("POST /organizations/:organizationId/workspaces", OperationPolicy::roles(MANAGER));
        declare("GET /workspaces/:workspaceId", OperationPolicy::roles(VIEWER));
        declare("PUT /workspaces/:workspaceId", OperationPolicy::roles(MANAGER));
        declare("DELETE /workspaces/:workspaceId", OperationPolicy::roles(OWNER));
        declare("GET /workspaces/:workspaceId/members", OperationPolicy::roles(VIEWER));
        declare("POST /workspaces/:workspaceId/members", OperationPolicy::roles(MANAGER_OR_OWNER));
        declare("PUT /workspaces/:workspaceId/members/:userId", OperationPolicy::roles(MANAGER_OR_OWNER));
        declare("DELETE /workspaces/:workspaceId/members/:userId", OperationPolicy::roles(MANAGER_OR_OWNER));

        // Projects. Creation takes `workspaceId` in the request body and is
        // therefore workspace-scoped via inference over body fields. The
        // slug route declares its selector explicitly since a bare `slug`
        // is not inferable.
        declare("GET /workspaces/:workspaceId/projects", OperationPolicy::roles(VIEWER));
        declare("POST /projects", OperationPolicy::roles(MANAGER));
        declare("GET /projects/:projectId", OperationPolicy::roles(VIEWER));
        declare(
            "GET /projects/by-slug/:slug",
            OperationPolicy::scoped(VIEWER, ScopeSelector::new(ScopeKind::Project, "slug")),
        );
        declare("PUT /projects/:projectId", OperationPolicy::roles(MANAGER));
        declare("DELETE /projects/:projectId", OperationPolicy::roles(OWNER));
        declare("GET /projects/:projectId/members", OperationPolicy::roles(VIEWER));
        declare("POST /projects/:projectId/members", OperationPolicy::roles(MANAGER_OR_OWNER));
        declare("PUT /projects/:projectId/members/:userId", OperationPolicy::roles(MANAGER_OR_OWNER));
        declare("DELETE /projects/:projectId/members/:userId", OperationPolicy::roles(MANAGER_OR_OWNER));

        // Tasks, nested under their project.
        declare("GET /projects/:projectId/tasks", OperationPolicy::roles(VIEWER));
        declare("POST /projects/:projectId/tasks", OperationPolicy::roles(MEMBER));
        declare("GET /projects/:projectId/tasks/:taskId", OperationPolicy::roles(VIEWER));
        declare("PUT /projects/:projectId/tasks/:taskId", OperationPolicy::roles(MEMBER));
        declare("DELETE /projects/:projectId/tasks/:taskId", OperationPolicy::roles(MANAGER));

        // Read-side collaborators.
        declare("GET /organizations/:organizationId/analytics/overview", OperationPolicy::roles(VIEWER));
        declare("GET /organizations/:organizationId/search", OperationPolicy::roles(VIEWER));

        Self { policies }
    }

    pub fn policy(&self, method: &str, route: &str) -> Option<&OperationPolicy> {
        self.policies.get(format!("{method} {route}").as_str())
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_route_declares_its_scope_explicitly() {
        let registry = PolicyRegistry::standard();
        let policy = registry.policy("GET", "/projects/by-slug/:slug").unwrap();
        let scope = policy.scope.unwrap();
        assert_eq!(scope.kind, ScopeKind::Project);
        assert_eq!(scope.locator, "slug");
    }

    #[test]
    fn unlisted_operations_have_no_policy() {
        let registry = PolicyRegistry::standard();
        assert!(registry.policy("GET", "/health").is_none());
        assert!(registry.policy("POST", "/auth/login").is_none());
    }

    #[test]
    fn mutations_require_higher_ranks_than_reads() {
        let registry = PolicyRegistry::standard();
        let read = registry.policy("GET", "/organizations/:organizationId").unwrap();
        let update = registry.policy("PUT", "/organizations/:organizationId").unwrap();
        let delete = registry.policy("DELETE", "/organizations/:organizationId").unwrap();
        assert_eq!(read.required_roles, &[Role::Viewer]);
        assert_eq!(update.required_roles, &[Role::Manager]);
        assert_eq!(delete.required_roles, &[Role::Owner]);
    }
}
