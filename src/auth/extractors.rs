use std::{marker::PhantomData, sync::Arc};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use crate::{
    auth::{
        jwt::SessionKeys,
        repo::CredentialStore,
        repo_types::{Account, Role},
    },
    error::AppError,
    state::AppState,
};

/// Resolves the caller behind a bearer token and checks its role.
#[derive(Clone)]
pub struct AuthorizationGate {
    keys: SessionKeys,
    accounts: Arc<dyn CredentialStore>,
}

impl FromRef<AppState> for AuthorizationGate {
    fn from_ref(state: &AppState) -> Self {
        Self {
            keys: SessionKeys::from_ref(state),
            accounts: state.accounts.clone(),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::unauthenticated("Login first to access this resource"))?
        .to_str()
        .map_err(|_| AppError::unauthenticated("Invalid Authorization header"))?;

    // Expect "Bearer <token>"
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::unauthenticated("Invalid Authorization header"))?;
    Ok(token)
}

impl AuthorizationGate {
    pub async fn identify(&self, headers: &HeaderMap) -> Result<Account, AppError> {
        let token = bearer_token(headers)?;
        let claims = self.keys.verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            AppError::unauthenticated("Invalid or expired token")
        })?;
        self.accounts
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "token for missing account");
                AppError::unauthenticated("User no longer exists")
            })
    }

    pub fn authorize(account: &Account, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&account.role) {
            return Ok(());
        }
        warn!(user_id = %account.id, role = %account.role, "role not allowed");
        Err(AppError::Forbidden(format!(
            "Role ({}) is not allowed to access this resource",
            account.role
        )))
    }
}

/// Any identified caller.
pub struct CurrentUser(pub Account);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let gate = AuthorizationGate::from_ref(state);
        gate.identify(&parts.headers).await.map(CurrentUser)
    }
}

/// Route-declared set of permitted roles.
pub trait RoleSet: Send + Sync + 'static {
    const ALLOWED: &'static [Role];
}

pub struct Employers;

impl RoleSet for Employers {
    const ALLOWED: &'static [Role] = &[Role::Employer];
}

/// An identified caller whose role is in `R`.
pub struct Authorized<R: RoleSet> {
    pub account: Account,
    _roles: PhantomData<fn() -> R>,
}

#[async_trait]
impl<R: RoleSet> FromRequestParts<AppState> for Authorized<R> {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(account) = CurrentUser::from_request_parts(parts, state).await?;
        AuthorizationGate::authorize(&account, R::ALLOWED)?;
        Ok(Authorized {
            account,
            _roles: PhantomData,
        })
    }
}
