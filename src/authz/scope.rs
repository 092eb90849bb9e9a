use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The three permission boundaries, from widest to narrowest. A project
/// belongs to exactly one workspace, a workspace to exactly one
/// organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Organization,
    Workspace,
    Project,
}

impl ScopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeKind::Organization => "organization",
            ScopeKind::Workspace => "workspace",
            ScopeKind::Project => "project",
        }
    }
}

/// Names which request field carries the scope identifier for an operation,
/// and at which level it applies. Operations may declare one explicitly;
/// otherwise `infer_scope` derives it from the parameter names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeSelector {
    pub kind: ScopeKind,
    pub locator: &'static str,
}

impl ScopeSelector {
    pub const fn new(kind: ScopeKind, locator: &'static str) -> Self {
        Self { kind, locator }
    }
}

/// Request parameters merged from their three sources. Lookup priority is
/// fixed: path params shadow query params, query params shadow body fields.
#[derive(Debug, Clone, Default)]
pub struct ParamBag {
    path: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Vec<(String, String)>,
}

impl ParamBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_path(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.path.push((name.into(), value.into()));
    }

    pub fn push_query(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.query.push((name.into(), value.into()));
    }

    pub fn push_body(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.body.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        for source in [&self.path, &self.query, &self.body] {
            if let Some((_, value)) = source.iter().find(|(key, _)| key == name) {
                return Some(value.as_str());
            }
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Derives the scope of an operation from its parameter names when no
/// selector was declared. The rules run in containment order: an
/// organization-identifying field always wins over a workspace one, and so
/// on down; a generic `id` (with or without `slug`) is taken to identify a
/// project, which is the convention the route surface follows. Returns
/// `None` when nothing matches -- a configuration problem, not a denial.
pub fn infer_scope(params: &ParamBag) -> Option<ScopeSelector> {
    if params.contains("organizationId") {
        return Some(ScopeSelector::new(ScopeKind::Organization, "organizationId"));
    }
    if params.contains("workspaceId") {
        return Some(ScopeSelector::new(ScopeKind::Workspace, "workspaceId"));
    }
    if params.contains("projectId") {
        return Some(ScopeSelector::new(ScopeKind::Project, "projectId"));
    }
    if params.contains("id") && params.contains("slug") {
        return Some(ScopeSelector::new(ScopeKind::Project, "slug"));
    }
    if params.contains("id") {
        return Some(ScopeSelector::new(ScopeKind::Project, "id"));
    }
    None
}
