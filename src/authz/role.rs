use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Scope-level role. The set is closed and totally ordered; `rank` is the
/// only comparison primitive the rest of the crate uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Member,
    Manager,
    Owner,
}

impl Role {
    /// All roles, lowest rank first. Fixed at compile time, never mutated.
    pub const ORDERED: [Role; 4] = [Role::Viewer, Role::Member, Role::Manager, Role::Owner];

    pub fn rank(self) -> u8 {
        match self {
            Role::Viewer => 0,
            Role::Member => 1,
            Role::Manager => 2,
            Role::Owner => 3,
        }
    }

    /// `true` when this role's rank meets or exceeds `other`'s.
    pub fn at_least(self, other: Role) -> bool {
        self.rank() >= other.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Member => "member",
            Role::Manager => "manager",
            Role::Owner => "owner",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "viewer" => Some(Role::Viewer),
            "member" => Some(Role::Member),
            "manager" => Some(Role::Manager),
            "owner" => Some(Role::Owner),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform-wide role carried on the user record (and in the token claims).
/// `SuperAdmin` is not part of the scope-role order; it is checked as a
/// distinct condition before any scope resolution happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum GlobalRole {
    #[default]
    User,
    SuperAdmin,
}

impl GlobalRole {
    pub fn as_str(self) -> &'static str {
        match self {
            GlobalRole::User => "user",
            GlobalRole::SuperAdmin => "super_admin",
        }
    }

    pub fn parse(value: &str) -> Option<GlobalRole> {
        match value {
            "user" => Some(GlobalRole::User),
            "super_admin" => Some(GlobalRole::SuperAdmin),
            _ => None,
        }
    }

    pub fn is_super_admin(self) -> bool {
        matches!(self, GlobalRole::SuperAdmin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_is_a_total_order() {
        // Strictly monotonic: no two roles share a rank.
        for (i, a) in Role::ORDERED.iter().enumerate() {
            for (j, b) in Role::ORDERED.iter().enumerate() {
                assert_eq!(a.rank() == b.rank(), i == j);
                assert_eq!(a.rank() < b.rank(), i < j);
            }
        }
    }

    #[test]
    fn rank_comparison_is_transitive_and_antisymmetric() {
        for a in Role::ORDERED {
            for b in Role::ORDERED {
                if a.at_least(b) && b.at_least(a) {
                    assert_eq!(a, b);
                }
                for c in Role::ORDERED {
                    if a.at_least(b) && b.at_least(c) {
                        assert!(a.at_least(c));
                    }
                }
            }
        }
    }

    #[test]
    fn parse_rejects_unknown_roles() {
        assert_eq!(Role::parse("owner"), Some(Role::Owner));
        assert_eq!(Role::parse("admin"), None);
        assert_eq!(Role::parse(""), None);
        assert_eq!(GlobalRole::parse("super_admin"), Some(GlobalRole::SuperAdmin));
        assert_eq!(GlobalRole::parse("root"), None);
    }
}
