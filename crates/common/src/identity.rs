//! Caller identity handed over by the authentication collaborator.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Role of an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// An ordinary shopper.
    #[default]
    User,

    /// Administrative role allowed to deliver and reject orders.
    Operator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Operator => "operator",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "operator" | "admin" => Ok(Role::Operator),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A verified caller. The core trusts this value and never re-verifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Creates an ordinary shopper identity.
    pub fn user(user_id: UserId) -> Self {
        Self::new(user_id, Role::User)
    }

    /// Creates an operator identity.
    pub fn operator(user_id: UserId) -> Self {
        Self::new(user_id, Role::Operator)
    }

    pub fn is_operator(&self) -> bool {
        self.role == Role::Operator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("user".parse::<Role>(), Ok(Role::User));
        assert_eq!(" Operator ".parse::<Role>(), Ok(Role::Operator));
        assert_eq!("admin".parse::<Role>(), Ok(Role::Operator));
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_caller_constructors() {
        let id = UserId::new();
        assert!(!Caller::user(id).is_operator());
        assert!(Caller::operator(id).is_operator());
        assert_eq!(Caller::user(id).user_id, id);
    }
}
