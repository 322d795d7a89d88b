//! Actors and the sign-off capability check.
//!
//! An actor is supplied per request by the authentication layer; only its
//! identity and role matter here. The role set is closed: other roles exist
//! elsewhere in the system but cannot sign.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::study::StudyDetail;

/// Roles that participate in the sign-off workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Resident,
    Attending,
}

impl Role {
    /// Parse a role string as stored/transported ("admin", "resident", "attending").
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "resident" => Some(Self::Resident),
            "attending" => Some(Self::Attending),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Resident => "resident",
            Self::Attending => "attending",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

impl Actor {
    pub fn new(id: i64, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Which approval flag a sign-off request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignTarget {
    Resident,
    Attending,
}

/// Whether `actor` may toggle the `target` flag on `study`.
///
/// Admins may always sign; residents and attendings only for studies they
/// are the corresponding physician on. Preconditions between the two flags
/// (resident-first ordering) are checked by the state machine, not here.
pub fn can_sign(actor: &Actor, study: &StudyDetail, target: SignTarget) -> bool {
    if actor.is_admin() {
        return true;
    }
    match target {
        SignTarget::Resident => actor.role == Role::Resident && actor.id == study.resident_id,
        SignTarget::Attending => actor.role == Role::Attending && actor.id == study.attending_id,
    }
}
