//! Per-request call context resolution and the admin-role gate

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tenantflow_core::{CallContext, CoreError, Scope};
use tracing::debug;

use super::errors::ApiError;
use super::AppState;
use crate::config::ServerConfig;

/// Turns request metadata into a [`CallContext`]
#[async_trait]
pub trait ContextResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Result<CallContext, CoreError>;
}

/// Reads tenant, user and roles from configurable headers
///
/// The scope is the tenant when present, otherwise the user.
#[derive(Debug, Clone)]
pub struct HeaderContextResolver {
    tenant_header: String,
    user_header: String,
    roles_header: String,
}

impl HeaderContextResolver {
    pub fn new(
        tenant_header: impl Into<String>,
        user_header: impl Into<String>,
        roles_header: impl Into<String>,
    ) -> Self {
        Self {
            tenant_header: tenant_header.into(),
            user_header: user_header.into(),
            roles_header: roles_header.into(),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.tenant_header.clone(),
            config.user_header.clone(),
            config.roles_header.clone(),
        )
    }

    fn header(headers: &HeaderMap, name: &str) -> Option<String> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

#[async_trait]
impl ContextResolver for HeaderContextResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<CallContext, CoreError> {
        let tenant_id = Self::header(headers, &self.tenant_header);
        let user_id = Self::header(headers, &self.user_header);
        let roles = Self::header(headers, &self.roles_header)
            .map(|raw| {
                raw.split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let scope = match tenant_id.as_ref().or(user_id.as_ref()) {
            Some(id) => Some(Scope::new(id.clone())?),
            None => None,
        };

        Ok(CallContext {
            scope,
            tenant_id,
            user_id,
            roles,
            ..Default::default()
        })
    }
}

/// Resolve the call context and attach it to the request extensions
pub async fn resolve_context(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    match state.resolver.resolve(request.headers()).await {
        Ok(ctx) => {
            debug!(scope = ?ctx.scope, "Resolved call context");
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Reject admin requests whose roles miss every configured admin role
pub async fn admin_gate(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.enable_admin_role {
        return next.run(request).await;
    }

    let allowed = request
        .extensions()
        .get::<CallContext>()
        .map(|ctx| ctx.has_any_role(&state.config.admin_roles))
        .unwrap_or(false);

    if allowed {
        next.run(request).await
    } else {
        debug!(path = %request.uri().path(), "Admin role check failed");
        ApiError::Unauthorized.into_response()
    }
}
