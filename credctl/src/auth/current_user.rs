//! Identity of the caller on admin routes.
//!
//! credctl does not issue sessions. An upstream gateway authenticates the caller and forwards
//! its user id in the configured `requester_header`; handlers that act on behalf of someone take
//! a [`Requester`] argument. Whether that id names a real, active account is decided by the
//! service being called, not here.

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{instrument, trace};
use uuid::Uuid;

use crate::{
    AppState,
    errors::{Error, Result},
    types::UserId,
};

/// The user id asserted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester(pub UserId);

impl Requester {
    fn from_parts(parts: &Parts, header: &str) -> Result<Self> {
        let value = parts.headers.get(header).ok_or(Error::Unauthenticated)?;
        let value = value.to_str().map_err(|_| Error::Unauthenticated)?;
        let id = Uuid::parse_str(value.trim()).map_err(|_| {
            trace!("Requester header is not a UUID");
            Error::Unauthenticated
        })?;
        Ok(Self(id))
    }
}

impl FromRequestParts<AppState> for Requester {
    type Rejection = Error;

    #[instrument(skip_all)]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        Self::from_parts(parts, &state.config.requester_header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header: Option<(&str, &str)>) -> Parts {
        let mut builder = Request::builder().uri("/admin/api/v1/users");
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_reads_configured_header() {
        let id = Uuid::new_v4();
        let parts = parts(Some(("x-gateway-user", &id.to_string())));
        assert_eq!(Requester::from_parts(&parts, "x-gateway-user").unwrap(), Requester(id));
    }

    #[test]
    fn test_missing_or_malformed_header_is_unauthenticated() {
        assert!(matches!(
            Requester::from_parts(&parts(None), "x-credctl-user-id"),
            Err(Error::Unauthenticated)
        ));
        assert!(matches!(
            Requester::from_parts(&parts(Some(("x-credctl-user-id", "admin"))), "x-credctl-user-id"),
            Err(Error::Unauthenticated)
        ));
        // a different header does not count
        let id = Uuid::new_v4().to_string();
        assert!(matches!(
            Requester::from_parts(&parts(Some(("x-user-id", &id))), "x-credctl-user-id"),
            Err(Error::Unauthenticated)
        ));
    }
}
