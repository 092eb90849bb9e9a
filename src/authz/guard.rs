use std::collections::HashMap;

use axum::body::{to_bytes, Body};
use axum::extract::{FromRequestParts, MatchedPath, Query, RawPathParams, Request, State};
use axum::http::request::Parts;
use axum::http::{header, Method};
use axum::middleware::Next;
use axum::response::Response;

use crate::app::AppState;
use crate::errors::AppError;

use super::engine::{authorize, AccessVerdict, Actor, DenyReason};
use super::resolver::SqliteMembershipResolver;
use super::scope::ParamBag;

// Requests with bodies larger than this are rejected before the handler
// runs; JSON payloads in this API are small.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Request-pipeline guard. Runs after routing, looks the operation up in
/// the policy registry by its matched route pattern, assembles the
/// parameter bag from path, query and body, and evaluates the decision
/// procedure before the handler is reached. Operations absent from the
/// registry pass through untouched.
pub async fn enforce(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = request.into_parts();

    let Some(route) = parts.extensions.get::<MatchedPath>().map(|m| m.as_str().to_string()) else {
        return Ok(next.run(Request::from_parts(parts, body)).await);
    };

    let Some(policy) = state.policies.policy(parts.method.as_str(), &route) else {
        return Ok(next.run(Request::from_parts(parts, body)).await);
    };
    let policy = *policy;

    let actor = bearer_actor(&parts, &state);

    let mut params = ParamBag::new();

    if let Ok(raw) = RawPathParams::from_request_parts(&mut parts, &state).await {
        for (name, value) in &raw {
            params.push_path(name, value);
        }
    }

    if let Ok(Query(query)) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri) {
        for (name, value) in query {
            params.push_query(name, value);
        }
    }

    // JSON bodies are buffered so their top-level fields can participate in
    // scope inference; the handler reads the same bytes afterwards.
    let request = if wants_body_fields(&parts) {
        let bytes = to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|err| AppError::bad_request(format!("failed to read request body: {err}")))?;

        if let Ok(serde_json::Value::Object(fields)) = serde_json::from_slice(&bytes) {
            for (name, value) in fields {
                match value {
                    serde_json::Value::String(text) => params.push_body(name, text),
                    serde_json::Value::Number(number) => params.push_body(name, number.to_string()),
                    _ => {}
                }
            }
        }

        Request::from_parts(parts, Body::from(bytes))
    } else {
        Request::from_parts(parts, body)
    };

    let resolver = SqliteMembershipResolver::new(state.pool.clone());
    match authorize(actor.as_ref(), &policy, &params, &resolver).await? {
        AccessVerdict::Allow => Ok(next.run(request).await),
        AccessVerdict::Deny(reason) => {
            tracing::debug!(method = %request.method(), route = %route, reason = ?reason, "request denied");
            Err(deny_error(reason))
        }
    }
}

fn bearer_actor(parts: &Parts, state: &AppState) -> Option<Actor> {
    let token = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))?;

    let claims = state.jwt.decode(token).ok()?;
    Some(Actor { user_id: claims.sub, global_role: claims.role })
}

fn wants_body_fields(parts: &Parts) -> bool {
    let has_body = parts.method == Method::POST
        || parts.method == Method::PUT
        || parts.method == Method::PATCH;
    if !has_body {
        return false;
    }
    parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

fn deny_error(reason: DenyReason) -> AppError {
    match reason {
        DenyReason::Unauthenticated => AppError::unauthorized(reason.message()),
        DenyReason::ScopeNotSpecified | DenyReason::ScopeIdMissing => {
            AppError::bad_request(reason.message())
        }
        DenyReason::NotFound => AppError::not_found(reason.message()),
        DenyReason::NotAMember | DenyReason::InsufficientRole => {
            AppError::forbidden(reason.message())
        }
    }
}
