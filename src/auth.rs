//! Caller authorization.
//!
//! The registry deciding who may act lives outside this crate; the engine
//! only consumes its predicate.

use alloy::primitives::Address;
use dashmap::DashSet;

/// Registry predicate consulted at the top of every caller-initiated
/// mutating entry point.
pub trait Authorizer: Send + Sync {
    /// Whether `caller` may act.
    fn is_authorized(&self, caller: &Address) -> bool;
}

/// Static allow list of authorized callers.
#[derive(Debug, Default)]
pub struct AllowList {
    members: DashSet<Address>,
}

impl AllowList {
    /// Create an empty allow list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant access to `caller`.
    pub fn grant(&self, caller: Address) {
        self.members.insert(caller);
    }

    /// Revoke access from `caller`.
    pub fn revoke(&self, caller: &Address) {
        self.members.remove(caller);
    }

    /// Number of authorized callers.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether nobody is authorized.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl FromIterator<Address> for AllowList {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        let list = Self::new();
        for caller in iter {
            list.grant(caller);
        }
        list
    }
}

impl Authorizer for AllowList {
    fn is_authorized(&self, caller: &Address) -> bool {
        self.members.contains(caller)
    }
}
