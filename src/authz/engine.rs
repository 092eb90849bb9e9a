use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::project::Visibility;

use super::registry::OperationPolicy;
use super::resolver::MembershipResolver;
use super::role::{GlobalRole, Role};
use super::scope::{infer_scope, ParamBag, ScopeKind};

/// The authenticated caller as the engine sees it: identity plus the
/// platform-wide role. Built from the token claims; never from the request
/// body.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
    pub global_role: GlobalRole,
}

/// Outcome of one authorization check. Recomputed per request, never
/// cached or persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessVerdict {
    Allow,
    Deny(DenyReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    ScopeNotSpecified,
    ScopeIdMissing,
    NotFound,
    NotAMember,
    InsufficientRole,
}

impl DenyReason {
    pub fn message(self) -> &'static str {
        match self {
            DenyReason::Unauthenticated => "not authenticated",
            DenyReason::ScopeNotSpecified => "operation scope not specified",
            DenyReason::ScopeIdMissing => "scope identifier missing from request",
            DenyReason::NotFound => "scope not found",
            DenyReason::NotAMember => "not a member of this scope",
            DenyReason::InsufficientRole => "insufficient role for this operation",
        }
    }
}

/// Decides whether `actor` may perform an operation governed by `policy`,
/// given the request parameters in `params`. One membership lookup per
/// call (plus one project lookup when the scope is a project), no state
/// kept between calls.
pub async fn authorize(
    actor: Option<&Actor>,
    policy: &OperationPolicy,
    params: &ParamBag,
    resolver: &dyn MembershipResolver,
) -> AppResult<AccessVerdict> {
    let Some(actor) = actor else {
        return Ok(AccessVerdict::Deny(DenyReason::Unauthenticated));
    };

    if actor.global_role.is_super_admin() {
        tracing::debug!(user_id = %actor.user_id, "super_admin bypass");
        return Ok(AccessVerdict::Allow);
    }

    if policy.required_roles.is_empty() {
        return Ok(AccessVerdict::Allow);
    }

    let scope = match policy.scope.or_else(|| infer_scope(params)) {
        Some(scope) => scope,
        None => return Ok(AccessVerdict::Deny(DenyReason::ScopeNotSpecified)),
    };

    let Some(locator_value) = params.get(scope.locator) else {
        return Ok(AccessVerdict::Deny(DenyReason::ScopeIdMissing));
    };

    // Project scopes may be located by slug or id; either way the project's
    // visibility is known before the membership step so a public project
    // can short-circuit the check entirely.
    let mut scope_id = locator_value.to_string();
    if scope.kind == ScopeKind::Project {
        if scope.locator == "slug" {
            match resolver.project_by_slug(locator_value).await? {
                None => return Ok(AccessVerdict::Deny(DenyReason::NotFound)),
                Some(project) => {
                    if project.visibility == Visibility::Public {
                        return Ok(AccessVerdict::Allow);
                    }
                    scope_id = project.id.to_string();
                }
            }
        } else if let Some(project) = resolver.project_by_id(locator_value).await? {
            if project.visibility == Visibility::Public {
                return Ok(AccessVerdict::Allow);
            }
        }
    }

    // Organization lookups validate the id shape first; a malformed id is
    // treated as "no membership", not an error. The narrower scopes pass
    // the raw locator through, where it simply matches no row.
    if scope.kind == ScopeKind::Organization && Uuid::parse_str(&scope_id).is_err() {
        tracing::debug!(scope_id = %scope_id, "malformed organization id, treating as non-member");
        return Ok(AccessVerdict::Deny(DenyReason::NotAMember));
    }

    let Some(role) = resolver.membership(scope.kind, actor.user_id, &scope_id).await? else {
        tracing::debug!(
            user_id = %actor.user_id,
            scope = scope.kind.as_str(),
            scope_id = %scope_id,
            "no membership"
        );
        return Ok(AccessVerdict::Deny(DenyReason::NotAMember));
    };

    if policy.required_roles.iter().any(|required| role.at_least(*required)) {
        Ok(AccessVerdict::Allow)
    } else {
        tracing::debug!(
            user_id = %actor.user_id,
            scope = scope.kind.as_str(),
            role = role.as_str(),
            "insufficient role"
        );
        Ok(AccessVerdict::Deny(DenyReason::InsufficientRole))
    }
}

/// Whether the caller gets the organization-wide view of read-heavy
/// collaborators (analytics, search) rather than the self-scoped one:
/// manager-or-above at the scope, the platform super-role, or -- for
/// organization scopes -- the owner recorded on the organization row even
/// without a membership row. Shares the resolver with `authorize` so both
/// sides agree on who holds elevated rights.
pub async fn is_elevated(
    actor: &Actor,
    kind: ScopeKind,
    scope_id: &str,
    resolver: &dyn MembershipResolver,
) -> AppResult<bool> {
    if actor.global_role.is_super_admin() {
        return Ok(true);
    }

    if kind == ScopeKind::Organization {
        if Uuid::parse_str(scope_id).is_err() {
            return Ok(false);
        }
        if resolver.organization_owner(scope_id).await? == Some(actor.user_id) {
            return Ok(true);
        }
    }

    let role = resolver.membership(kind, actor.user_id, scope_id).await?;
    Ok(role.is_some_and(|role| role.at_least(Role::Manager)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::super::registry::OperationPolicy;
    use super::super::resolver::ProjectRef;
    use super::super::scope::ScopeSelector;
    use super::*;

    #[derive(Default)]
    struct FakeResolver {
        memberships: HashMap<(ScopeKind, Uuid, String), Role>,
        projects_by_slug: HashMap<String, ProjectRef>,
        projects_by_id: HashMap<String, ProjectRef>,
        org_owners: HashMap<String, Uuid>,
    }

    impl FakeResolver {
        fn with_membership(mut self, kind: ScopeKind, user: Uuid, scope: &str, role: Role) -> Self {
            self.memberships.insert((kind, user, scope.to_string()), role);
            self
        }

        fn with_project(mut self, id: Uuid, slug: &str, visibility: Visibility) -> Self {
            let project = ProjectRef { id, visibility };
            self.projects_by_slug.insert(slug.to_string(), project);
            self.projects_by_id.insert(id.to_string(), project);
            self
        }

        fn with_org_owner(mut self, org: &str, owner: Uuid) -> Self {
            self.org_owners.insert(org.to_string(), owner);
            self
        }
    }

    #[async_trait]
    impl MembershipResolver for FakeResolver {
        async fn membership(
            &self,
            kind: ScopeKind,
            user_id: Uuid,
            scope_id: &str,
        ) -> AppResult<Option<Role>> {
            Ok(self.memberships.get(&(kind, user_id, scope_id.to_string())).copied())
        }

        async fn project_by_slug(&self, slug: &str) -> AppResult<Option<ProjectRef>> {
            Ok(self.projects_by_slug.get(slug).copied())
        }

        async fn project_by_id(&self, project_id: &str) -> AppResult<Option<ProjectRef>> {
            Ok(self.projects_by_id.get(project_id).copied())
        }

        async fn organization_owner(&self, organization_id: &str) -> AppResult<Option<Uuid>> {
            Ok(self.org_owners.get(organization_id).copied())
        }
    }

    fn user() -> Actor {
        Actor { user_id: Uuid::new_v4(), global_role: GlobalRole::User }
    }

    fn super_admin() -> Actor {
        Actor { user_id: Uuid::new_v4(), global_role: GlobalRole::SuperAdmin }
    }

    fn org_params(org: &str) -> ParamBag {
        let mut params = ParamBag::new();
        params.push_path("organizationId", org);
        params
    }

    const MANAGER_OR_OWNER: &[Role] = &[Role::Manager, Role::Owner];
    const VIEWER: &[Role] = &[Role::Viewer];

    #[tokio::test]
    async fn missing_actor_is_denied_before_anything_else() {
        let resolver = FakeResolver::default();
        let policy = OperationPolicy::roles(VIEWER);
        let verdict = authorize(None, &policy, &org_params("o"), &resolver).await.unwrap();
        assert_eq!(verdict, AccessVerdict::Deny(DenyReason::Unauthenticated));
    }

    #[tokio::test]
    async fn super_admin_bypasses_scope_and_membership() {
        let resolver = FakeResolver::default();
        let actor = super_admin();
        let policy = OperationPolicy::roles(MANAGER_OR_OWNER);
        // No scope param at all: the bypass fires before scope resolution.
        let verdict = authorize(Some(&actor), &policy, &ParamBag::new(), &resolver).await.unwrap();
        assert_eq!(verdict, AccessVerdict::Allow);
    }

    #[tokio::test]
    async fn empty_required_roles_allows_any_authenticated_caller() {
        let resolver = FakeResolver::default();
        let actor = user();
        let policy = OperationPolicy::roles(&[]);
        let verdict = authorize(Some(&actor), &policy, &ParamBag::new(), &resolver).await.unwrap();
        assert_eq!(verdict, AccessVerdict::Allow);
    }

    #[tokio::test]
    async fn uninferable_scope_is_a_distinct_outcome() {
        let resolver = FakeResolver::default();
        let actor = user();
        let policy = OperationPolicy::roles(VIEWER);
        let verdict = authorize(Some(&actor), &policy, &ParamBag::new(), &resolver).await.unwrap();
        assert_eq!(verdict, AccessVerdict::Deny(DenyReason::ScopeNotSpecified));
    }

    #[tokio::test]
    async fn declared_selector_with_absent_value_is_scope_id_missing() {
        let resolver = FakeResolver::default();
        let actor = user();
        let policy = OperationPolicy::scoped(VIEWER, ScopeSelector::new(ScopeKind::Project, "slug"));
        let verdict = authorize(Some(&actor), &policy, &ParamBag::new(), &resolver).await.unwrap();
        assert_eq!(verdict, AccessVerdict::Deny(DenyReason::ScopeIdMissing));
    }

    #[tokio::test]
    async fn member_below_required_rank_is_denied_then_allowed_after_promotion() {
        let actor = user();
        let org = Uuid::new_v4().to_string();
        let policy = OperationPolicy::roles(MANAGER_OR_OWNER);

        let resolver = FakeResolver::default()
            .with_membership(ScopeKind::Organization, actor.user_id, &org, Role::Member);
        let verdict = authorize(Some(&actor), &policy, &org_params(&org), &resolver).await.unwrap();
        assert_eq!(verdict, AccessVerdict::Deny(DenyReason::InsufficientRole));

        let resolver = FakeResolver::default()
            .with_membership(ScopeKind::Organization, actor.user_id, &org, Role::Manager);
        let verdict = authorize(Some(&actor), &policy, &org_params(&org), &resolver).await.unwrap();
        assert_eq!(verdict, AccessVerdict::Allow);
    }

    #[tokio::test]
    async fn public_project_by_slug_needs_no_membership() {
        let actor = user();
        let project_id = Uuid::new_v4();
        let resolver = FakeResolver::default()
            .with_project(project_id, "proj-x", Visibility::Public);

        let mut params = ParamBag::new();
        params.push_path("id", &project_id.to_string());
        params.push_path("slug", "proj-x");

        let policy = OperationPolicy::roles(VIEWER);
        let verdict = authorize(Some(&actor), &policy, &params, &resolver).await.unwrap();
        assert_eq!(verdict, AccessVerdict::Allow);
    }

    #[tokio::test]
    async fn unresolved_slug_is_not_found() {
        let actor = user();
        let resolver = FakeResolver::default();
        let policy = OperationPolicy::scoped(VIEWER, ScopeSelector::new(ScopeKind::Project, "slug"));

        let mut params = ParamBag::new();
        params.push_path("slug", "nope");

        let verdict = authorize(Some(&actor), &policy, &params, &resolver).await.unwrap();
        assert_eq!(verdict, AccessVerdict::Deny(DenyReason::NotFound));
    }

    #[tokio::test]
    async fn private_project_without_membership_is_not_a_member() {
        let actor = user();
        let project_id = Uuid::new_v4();
        let resolver = FakeResolver::default()
            .with_project(project_id, "quiet", Visibility::Private);

        let mut params = ParamBag::new();
        params.push_path("projectId", &project_id.to_string());

        let policy = OperationPolicy::roles(VIEWER);
        let verdict = authorize(Some(&actor), &policy, &params, &resolver).await.unwrap();
        assert_eq!(verdict, AccessVerdict::Deny(DenyReason::NotAMember));
    }

    #[tokio::test]
    async fn internal_visibility_does_not_short_circuit() {
        let actor = user();
        let project_id = Uuid::new_v4();
        let resolver = FakeResolver::default()
            .with_project(project_id, "internal-proj", Visibility::Internal);

        let mut params = ParamBag::new();
        params.push_path("slug", "internal-proj");

        let policy = OperationPolicy::scoped(VIEWER, ScopeSelector::new(ScopeKind::Project, "slug"));
        let verdict = authorize(Some(&actor), &policy, &params, &resolver).await.unwrap();
        assert_eq!(verdict, AccessVerdict::Deny(DenyReason::NotAMember));
    }

    #[tokio::test]
    async fn malformed_organization_id_short_circuits_to_non_member() {
        let actor = user();
        let resolver = FakeResolver::default();
        let policy = OperationPolicy::roles(VIEWER);
        let verdict =
            authorize(Some(&actor), &policy, &org_params("not-a-uuid"), &resolver).await.unwrap();
        assert_eq!(verdict, AccessVerdict::Deny(DenyReason::NotAMember));
    }

    #[tokio::test]
    async fn malformed_workspace_id_reaches_the_resolver() {
        // The id-shape guard applies to organization lookups only; narrower
        // scopes hand the raw locator to the store and match nothing.
        let actor = user();
        let resolver = FakeResolver::default();
        let policy = OperationPolicy::roles(VIEWER);

        let mut params = ParamBag::new();
        params.push_path("workspaceId", "not-a-uuid");

        let verdict = authorize(Some(&actor), &policy, &params, &resolver).await.unwrap();
        assert_eq!(verdict, AccessVerdict::Deny(DenyReason::NotAMember));
    }

    #[tokio::test]
    async fn verdict_is_stable_across_repeated_evaluation() {
        let actor = user();
        let org = Uuid::new_v4().to_string();
        let resolver = FakeResolver::default()
            .with_membership(ScopeKind::Organization, actor.user_id, &org, Role::Viewer);
        let policy = OperationPolicy::roles(MANAGER_OR_OWNER);
        let params = org_params(&org);

        let first = authorize(Some(&actor), &policy, &params, &resolver).await.unwrap();
        for _ in 0..5 {
            let again = authorize(Some(&actor), &policy, &params, &resolver).await.unwrap();
            assert_eq!(first, again);
        }
    }

    #[tokio::test]
    async fn manager_membership_is_elevated_member_is_not() {
        let actor = user();
        let org = Uuid::new_v4().to_string();

        let resolver = FakeResolver::default()
            .with_membership(ScopeKind::Organization, actor.user_id, &org, Role::Manager);
        assert!(is_elevated(&actor, ScopeKind::Organization, &org, &resolver).await.unwrap());

        let resolver = FakeResolver::default()
            .with_membership(ScopeKind::Organization, actor.user_id, &org, Role::Member);
        assert!(!is_elevated(&actor, ScopeKind::Organization, &org, &resolver).await.unwrap());
    }

    #[tokio::test]
    async fn organization_owner_is_elevated_without_membership_row() {
        let actor = user();
        let org = Uuid::new_v4().to_string();
        let resolver = FakeResolver::default().with_org_owner(&org, actor.user_id);
        assert!(is_elevated(&actor, ScopeKind::Organization, &org, &resolver).await.unwrap());
    }

    #[tokio::test]
    async fn super_admin_is_always_elevated() {
        let actor = super_admin();
        let resolver = FakeResolver::default();
        assert!(is_elevated(&actor, ScopeKind::Organization, "anything", &resolver).await.unwrap());
    }

    #[tokio::test]
    async fn elevated_is_false_for_strangers() {
        let actor = user();
        let resolver = FakeResolver::default();
        let org = Uuid::new_v4().to_string();
        assert!(!is_elevated(&actor, ScopeKind::Organization, &org, &resolver).await.unwrap());
    }
}
