use serde::{Deserialize, Serialize};

use crate::domain::{ChildId, ParentId, PartyRef};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Parent,
    Child,
}

/// The authenticated party performing an operation.
///
/// A child actor always carries the parent that owns it, so family scoping can
/// be checked without another lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Parent(ParentId),
    Child { child: ChildId, family: ParentId },
}

impl Actor {
    pub fn role(&self) -> Role {
        match self {
            Actor::Parent(_) => Role::Parent,
            Actor::Child { .. } => Role::Child,
        }
    }

    /// Id of the parent whose family the actor belongs to.
    pub fn family(&self) -> &ParentId {
        match self {
            Actor::Parent(p) => p,
            Actor::Child { family, .. } => family,
        }
    }

    pub fn as_party(&self) -> PartyRef {
        match self {
            Actor::Parent(p) => PartyRef::Parent(p.clone()),
            Actor::Child { child, .. } => PartyRef::Child(child.clone()),
        }
    }

    pub fn is_parent(&self, parent_id: &str) -> bool {
        matches!(self, Actor::Parent(p) if p.0 == parent_id)
    }

    pub fn is_child(&self, child_id: &str) -> bool {
        matches!(self, Actor::Child { child, .. } if child.0 == child_id)
    }
}
