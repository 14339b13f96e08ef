//! Caller identity as forwarded by the upstream auth gateway.
//!
//! Authentication itself happens outside this service; requests arrive with
//! `X-User-Id` and `X-User-Role` headers.  Handlers take an [`Actor`]
//! argument and call [`Actor::require_admin`] before administrative writes.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};

use crate::errors::{FundError, Result};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SystemAdmin,
    LabAdmin,
    Company,
    Mentor,
    Talent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemAdmin => "SYSTEM_ADMIN",
            Self::LabAdmin => "LAB_ADMIN",
            Self::Company => "COMPANY",
            Self::Mentor => "MENTOR",
            Self::Talent => "TALENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SYSTEM_ADMIN" => Some(Self::SystemAdmin),
            "LAB_ADMIN" => Some(Self::LabAdmin),
            "COMPANY" => Some(Self::Company),
            "MENTOR" => Some(Self::Mentor),
            "TALENT" => Some(Self::Talent),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::SystemAdmin | Self::LabAdmin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub role: Role,
}

impl Actor {
    /// Lab or system administrators only.
    pub fn require_admin(&self) -> Result<()> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(FundError::Forbidden(format!(
                "role {} may not perform this operation",
                self.role.as_str()
            )))
        }
    }

    fn from_headers(user_id: Option<&str>, role: Option<&str>) -> Result<Self> {
        let (Some(user_id), Some(role)) = (user_id, role) else {
            return Err(FundError::Unauthenticated);
        };
        let user_id = user_id
            .trim()
            .parse()
            .map_err(|_| FundError::Validation(format!("invalid {USER_ID_HEADER} '{user_id}'")))?;
        let role = Role::parse(role)
            .ok_or_else(|| FundError::Validation(format!("unknown role '{role}'")))?;
        Ok(Actor { user_id, role })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = FundError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
        };
        Actor::from_headers(header(USER_ID_HEADER), header(USER_ROLE_HEADER))
    }
}
