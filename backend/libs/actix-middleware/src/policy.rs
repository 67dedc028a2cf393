use event_schema::Role;

/// Which replica roles may pass a guarded route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolePolicy {
    AnyAuthenticated,
    AnyOf(Vec<Role>),
}

impl RolePolicy {
    pub fn any_authenticated() -> Self {
        RolePolicy::AnyAuthenticated
    }

    pub fn only(role: Role) -> Self {
        RolePolicy::AnyOf(vec![role])
    }

    pub fn any_of(roles: impl IntoIterator<Item = Role>) -> Self {
        RolePolicy::AnyOf(roles.into_iter().collect())
    }

    pub fn allows(&self, role: Role) -> bool {
        match self {
            RolePolicy::AnyAuthenticated => true,
            RolePolicy::AnyOf(roles) => roles.contains(&role),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_admin() {
        let policy = RolePolicy::only(Role::Admin);
        assert!(policy.allows(Role::Admin));
        assert!(!policy.allows(Role::Manager));
        assert!(!policy.allows(Role::Worker));
    }

    #[test]
    fn test_any_of() {
        let policy = RolePolicy::any_of([Role::Admin, Role::Manager]);
        assert!(policy.allows(Role::Manager));
        assert!(!policy.allows(Role::Bookkeeper));
    }

    #[test]
    fn test_any_authenticated() {
        assert!(Role::ALL
            .into_iter()
            .all(|r| RolePolicy::any_authenticated().allows(r)));
    }
}
