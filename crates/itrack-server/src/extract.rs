//! Caller resolution.
//!
//! The credential travels either as `Authorization: Bearer <token>` or as a
//! cookie; the header wins when both are present.

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;

use itrack_core::{PipelineError, Principal};

use crate::response::ApiError;
use crate::state::AppState;

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = credential_from(&parts.headers, &state.cookie_name);
        let principal = state
            .identity
            .authenticate(token.as_deref())
            .await
            .map_err(PipelineError::from)?;
        Ok(Self(principal))
    }
}

pub fn credential_from(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    bearer(headers).or_else(|| cookie(headers, cookie_name))
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(axum::http::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            let _ = map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn bearer_header() {
        let h = headers(&[(AUTHORIZATION, "Bearer abc.def.ghi")]);
        assert_eq!(credential_from(&h, "jwt").as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn cookie_fallback() {
        let h = headers(&[(COOKIE, "theme=dark; jwt=tok123; lang=en")]);
        assert_eq!(credential_from(&h, "jwt").as_deref(), Some("tok123"));
    }

    #[test]
    fn header_wins_over_cookie() {
        let h = headers(&[(AUTHORIZATION, "Bearer from-header"), (COOKIE, "jwt=from-cookie")]);
        assert_eq!(credential_from(&h, "jwt").as_deref(), Some("from-header"));
    }

    #[test]
    fn other_schemes_and_blank_values_ignored() {
        assert_eq!(credential_from(&headers(&[(AUTHORIZATION, "Basic dXNlcg==")]), "jwt"), None);
        assert_eq!(credential_from(&headers(&[(AUTHORIZATION, "Bearer   ")]), "jwt"), None);
        assert_eq!(credential_from(&headers(&[(COOKIE, "jwt=")]), "jwt"), None);
        assert_eq!(credential_from(&HeaderMap::new(), "jwt"), None);
    }
}
