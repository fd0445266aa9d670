//! # Caller Identity
//!
//! The graph never reads session state on its own. Every operation receives
//! an `IdentityResolver` from its caller and asks it, once, who is acting.
//! Resolution must have no side effects on the graph.

use crate::UserId;

/// The principal behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Caller {
    Authenticated(UserId),
    #[default]
    Anonymous,
}

impl Caller {
    #[must_use]
    pub const fn user(id: UserId) -> Self {
        Self::Authenticated(id)
    }

    /// The authenticated user, if any.
    #[must_use]
    pub const fn id(&self) -> Option<UserId> {
        match self {
            Self::Authenticated(id) => Some(*id),
            Self::Anonymous => None,
        }
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

impl From<Option<UserId>> for Caller {
    fn from(id: Option<UserId>) -> Self {
        id.map_or(Self::Anonymous, Self::Authenticated)
    }
}

/// Resolves the calling principal for one operation.
///
/// Implemented by transports (HTTP extractors, CLI flags) and by `Caller`
/// itself for callers that already know who they are.
pub trait IdentityResolver {
    fn resolve(&self) -> Caller;
}

impl IdentityResolver for Caller {
    fn resolve(&self) -> Caller {
        *self
    }
}

impl IdentityResolver for Option<UserId> {
    fn resolve(&self) -> Caller {
        Caller::from(*self)
    }
}

impl IdentityResolver for UserId {
    fn resolve(&self) -> Caller {
        Caller::Authenticated(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_resolves_to_caller() {
        assert_eq!(Some(UserId(3)).resolve(), Caller::user(UserId(3)));
        assert_eq!(None::<UserId>.resolve(), Caller::Anonymous);
    }

    #[test]
    fn caller_id() {
        assert_eq!(Caller::user(UserId(1)).id(), Some(UserId(1)));
        assert_eq!(Caller::Anonymous.id(), None);
        assert!(!Caller::default().is_authenticated());
    }
}
