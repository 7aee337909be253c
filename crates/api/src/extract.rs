//! Request extractors shared by the route handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{MemberId, PageRequest};
use serde::Deserialize;
use workflow::{Requester, Role};

use crate::error::ApiError;

pub const MEMBER_ID_HEADER: &str = "x-member-id";
pub const MEMBER_ROLE_HEADER: &str = "x-member-role";

/// The calling member, read from `x-member-id` and `x-member-role`.
///
/// Authentication happens in front of this service; the headers are trusted.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Requester);

impl Caller {
    pub fn member_id(&self) -> MemberId {
        self.0.member_id
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.0.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin access required".to_string()))
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let member_id = parts
            .headers
            .get(MEMBER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {MEMBER_ID_HEADER} header")))?
            .to_str()
            .map_err(|_| ApiError::BadRequest(format!("Invalid {MEMBER_ID_HEADER} header")))?;
        let member_id = parse_uuid(member_id).map(MemberId::from_uuid)?;

        let role = match parts.headers.get(MEMBER_ROLE_HEADER) {
            Some(value) => value
                .to_str()
                .map_err(|_| ApiError::BadRequest(format!("Invalid {MEMBER_ROLE_HEADER} header")))?
                .parse::<Role>()
                .map_err(ApiError::BadRequest)?,
            None => Role::Member,
        };

        Ok(Caller(Requester { member_id, role }))
    }
}

/// `?page=&size=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl PageParams {
    pub fn to_request(&self) -> Result<PageRequest, ApiError> {
        let first = PageRequest::first();
        Ok(PageRequest::new(
            self.page.unwrap_or(first.page()),
            self.size.unwrap_or(first.size()),
        )?)
    }
}

pub fn parse_uuid(id: &str) -> Result<uuid::Uuid, ApiError> {
    uuid::Uuid::parse_str(id).map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
