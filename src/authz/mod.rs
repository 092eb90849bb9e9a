//! Hierarchical authorization engine.
//!
//! Permissions are granted at three nested levels (organization,
//! workspace, project) through role-ranked memberships. This module holds:
//! - the fixed role order and its rank comparator
//! - per-operation scope declarations and the parameter-name inference
//!   that backs them
//! - the membership resolver interface over the per-scope tables
//! - the decision procedure producing a typed allow/deny verdict
//! - the elevated-access predicate the analytics and search collaborators
//!   use to pick between organization-wide and self-scoped views

mod engine;
pub mod guard;
mod registry;
mod resolver;
mod role;
mod scope;

pub use engine::{authorize, is_elevated, AccessVerdict, Actor, DenyReason};
pub use registry::{OperationPolicy, PolicyRegistry};
pub use resolver::{MembershipResolver, ProjectRef, SqliteMembershipResolver};
pub use role::{GlobalRole, Role};
pub use scope::{infer_scope, ParamBag, ScopeKind, ScopeSelector};
