//! Who is calling.

use std::str::FromStr;

use common::MemberId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Admin,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "member" | "user" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub member_id: MemberId,
    pub role: Role,
}

impl Requester {
    pub fn member(member_id: MemberId) -> Self {
        Self {
            member_id,
            role: Role::Member,
        }
    }

    pub fn admin(member_id: MemberId) -> Self {
        Self {
            member_id,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owners and admins may read a resource.
    pub fn can_access(&self, owner: MemberId) -> bool {
        self.is_admin() || self.member_id == owner
    }
}
