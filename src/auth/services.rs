use std::{sync::Arc, time::Duration};

use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{error, info, warn};

use crate::{
    auth::{
        digest::{digest_token, generate_reset_token},
        dto::{LoginRequest, RegisterRequest, UpdatePasswordRequest, UpdateProfileRequest},
        jwt::SessionKeys,
        password::{hash_password, verify_password, DUMMY_HASH, MIN_PASSWORD_LEN},
        repo::CredentialStore,
        repo_types::{Account, AccountPatch, NewAccount, ResetDigest, Role},
    },
    error::{AppError, StoreError},
    mail::{EmailDispatcher, EmailMessage},
    state::AppState,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    Ok(())
}

/// An authenticated account together with its freshly signed token.
#[derive(Debug)]
pub struct Session {
    pub account: Account,
    pub token: String,
}

/// Registration, login and password lifecycle.
#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn CredentialStore>,
    mailer: Arc<dyn EmailDispatcher>,
    keys: SessionKeys,
    reset_ttl: TimeDuration,
    public_url: String,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        Self {
            accounts: state.accounts.clone(),
            mailer: state.mailer.clone(),
            keys: SessionKeys::from_ref(state),
            reset_ttl: TimeDuration::minutes(state.config.reset_token_ttl_minutes),
            public_url: state.config.public_url.trim_end_matches('/').to_string(),
        }
    }
}

impl AuthService {
    pub fn session_ttl(&self) -> Duration {
        self.keys.ttl()
    }

    /// Mark cookies `Secure` when served over https.
    pub fn secure_cookies(&self) -> bool {
        self.public_url.starts_with("https://")
    }

    fn open_session(&self, account: Account) -> Result<Session, AppError> {
        let token = self.keys.sign(account.id)?;
        Ok(Session { account, token })
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<Session, AppError> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(AppError::validation("Please enter your name"));
        }
        let email = normalize_email(&req.email);
        if !is_valid_email(&email) {
            warn!(email = %email, "invalid email");
            return Err(AppError::validation("Please enter valid email address"));
        }
        validate_password(&req.password)?;
        let role = match req.role.as_deref() {
            None => Role::default(),
            Some(raw) => raw.trim().parse::<Role>().map_err(AppError::Validation)?,
        };

        let password_hash = hash_password(&req.password)?;
        let account = self
            .accounts
            .create(NewAccount {
                name: name.to_string(),
                email,
                role,
                password_hash,
            })
            .await
            .map_err(|e| {
                if let StoreError::Conflict(_) = &e {
                    warn!("email already registered");
                }
                AppError::from(e)
            })?;

        info!(user_id = %account.id, role = %account.role, "user registered");
        self.open_session(account)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<Session, AppError> {
        let email = normalize_email(&req.email);
        if email.is_empty() || req.password.is_empty() {
            return Err(AppError::MissingCredentials);
        }

        let Some(account) = self.accounts.find_by_email(&email).await? else {
            let _ = verify_password(&req.password, DUMMY_HASH);
            warn!(email = %email, "login unknown email");
            return Err(AppError::InvalidCredentials);
        };
        if !verify_password(&req.password, &account.password_hash)? {
            warn!(user_id = %account.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }

        info!(user_id = %account.id, "user logged in");
        self.open_session(account)
    }

    /// Store a reset digest and mail the raw token. A failed delivery clears
    /// the digest again before reporting `Delivery`.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AppError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AppError::validation("Please enter email"));
        }
        let account = self
            .accounts
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AppError::not_found("No user found with this email"))?;

        let (raw, digest) = generate_reset_token();
        let expires_at = OffsetDateTime::now_utc() + self.reset_ttl;
        self.accounts
            .update_by_id(
                account.id,
                AccountPatch {
                    reset: Some(Some(ResetDigest {
                        hash: digest,
                        expires_at,
                    })),
                    ..Default::default()
                },
            )
            .await?;

        let url = format!("{}/api/v1/password/reset/{}", self.public_url, raw);
        let message = EmailMessage {
            to: account.email.clone(),
            subject: "Jobboard password recovery".into(),
            body: format!(
                "Your password reset link is as follows:\n\n{url}\n\n\
                 The link expires in {} minutes. If you have not requested this, ignore this email.",
                self.reset_ttl.whole_minutes()
            ),
        };

        if let Err(e) = self.mailer.send(&message).await {
            warn!(user_id = %account.id, error = %e, "reset email failed, clearing digest");
            let rollback = AccountPatch {
                reset: Some(None),
                ..Default::default()
            };
            if let Err(re) = self.accounts.update_by_id(account.id, rollback).await {
                error!(user_id = %account.id, error = %re, "failed to clear reset digest");
            }
            return Err(AppError::Delivery(e));
        }

        info!(user_id = %account.id, "password reset email sent");
        Ok(())
    }

    pub async fn reset_password(
        &self,
        raw_token: &str,
        password: &str,
        confirm_password: Option<&str>,
    ) -> Result<Session, AppError> {
        validate_password(password)?;
        if confirm_password.is_some_and(|c| c != password) {
            return Err(AppError::validation("Password does not match"));
        }

        let password_hash = hash_password(password)?;
        let account = self
            .accounts
            .consume_reset_digest(
                &digest_token(raw_token),
                OffsetDateTime::now_utc(),
                &password_hash,
            )
            .await?
            .ok_or_else(|| {
                warn!("reset token invalid or expired");
                AppError::InvalidOrExpiredToken
            })?;

        info!(user_id = %account.id, "password reset");
        self.open_session(account)
    }

    pub async fn update_password(
        &self,
        caller: &Account,
        req: UpdatePasswordRequest,
    ) -> Result<Session, AppError> {
        if !verify_password(&req.current_password, &caller.password_hash)? {
            warn!(user_id = %caller.id, "current password mismatch");
            return Err(AppError::InvalidCredentials);
        }
        validate_password(&req.new_password)?;

        let account = self
            .accounts
            .update_by_id(
                caller.id,
                AccountPatch {
                    password_hash: Some(hash_password(&req.new_password)?),
                    ..Default::default()
                },
            )
            .await?;

        info!(user_id = %account.id, "password updated");
        self.open_session(account)
    }

    pub async fn update_profile(
        &self,
        caller: &Account,
        req: UpdateProfileRequest,
    ) -> Result<Account, AppError> {
        let mut patch = AccountPatch::default();
        if let Some(name) = req.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::validation("Please enter your name"));
            }
            patch.name = Some(name.to_string());
        }
        if let Some(email) = req.email {
            let email = normalize_email(&email);
            if !is_valid_email(&email) {
                return Err(AppError::validation("Please enter valid email address"));
            }
            patch.email = Some(email);
        }

        let account = self.accounts.update_by_id(caller.id, patch).await?;
        info!(user_id = %account.id, "profile updated");
        Ok(account)
    }

    pub async fn delete_account(&self, caller: &Account) -> Result<(), AppError> {
        self.accounts.delete_by_id(caller.id).await?;
        info!(user_id = %caller.id, "account deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, reset_token_in, Harness};

    fn service(h: &Harness) -> AuthService {
        AuthService::from_ref(&h.state)
    }

    fn registration(email: &str, password: &str, role: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            name: "Jane Doe".into(),
            email: email.into(),
            password: password.into(),
            role: role.map(str::to_string),
        }
    }

    fn login(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn email_format() {
        assert!(is_valid_email("jane@example.com"));
        assert!(!is_valid_email("jane@example"));
        assert!(!is_valid_email("jane doe@example.com"));
        assert!(!is_valid_email(""));
    }

    #[tokio::test]
    async fn registration_stores_hash_and_allows_login() {
        let h = harness();
        let svc = service(&h);
        let session = svc
            .register(registration("  Jane@Example.com ", "s3cret-pass", Some("employer")))
            .await
            .expect("register");
        assert_eq!(session.account.email, "jane@example.com");
        assert_eq!(session.account.role, Role::Employer);
        assert_ne!(session.account.password_hash, "s3cret-pass");
        assert!(session.account.password_hash.starts_with("$argon2"));

        let claims = SessionKeys::from_ref(&h.state).verify(&session.token).unwrap();
        assert_eq!(claims.sub, session.account.id);

        let again = svc
            .login(login("jane@example.com", "s3cret-pass"))
            .await
            .expect("login");
        assert_eq!(again.account.id, session.account.id);
    }

    #[tokio::test]
    async fn standard_user_role_name_is_accepted() {
        let h = harness();
        let svc = service(&h);
        let session = svc
            .register(registration("sam@example.com", "s3cret-pass", Some("standard-user")))
            .await
            .expect("register");
        assert_eq!(session.account.role, Role::User);
    }

    #[tokio::test]
    async fn registration_validates_input() {
        let h = harness();
        let svc = service(&h);
        let cases = [
            registration("jane@example.com", "s3cret-pass", Some("admin")),
            registration("not-an-email", "s3cret-pass", None),
            registration("jane@example.com", "short", None),
            RegisterRequest {
                name: "   ".into(),
                ..registration("jane@example.com", "s3cret-pass", None)
            },
        ];
        for req in cases {
            let err = svc.register(req).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "got {err:?}");
        }
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_case_insensitively() {
        let h = harness();
        let svc = service(&h);
        svc.register(registration("jane@example.com", "s3cret-pass", None))
            .await
            .unwrap();
        let err = svc
            .register(registration("JANE@example.com", "other-pass", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn login_requires_both_fields() {
        let h = harness();
        let svc = service(&h);
        let err = svc.login(login("", "whatever")).await.unwrap_err();
        assert!(matches!(err, AppError::MissingCredentials));
        let err = svc.login(login("jane@example.com", "")).await.unwrap_err();
        assert!(matches!(err, AppError::MissingCredentials));
    }

    #[tokio::test]
    async fn login_failure_does_not_reveal_which_field_was_wrong() {
        let h = harness();
        let svc = service(&h);
        svc.register(registration("jane@example.com", "s3cret-pass", None))
            .await
            .unwrap();

        let unknown = svc
            .login(login("nobody@example.com", "s3cret-pass"))
            .await
            .unwrap_err();
        let wrong = svc
            .login(login("jane@example.com", "wrong-pass"))
            .await
            .unwrap_err();
        assert!(matches!(unknown, AppError::InvalidCredentials));
        assert!(matches!(wrong, AppError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert_eq!(unknown.status(), wrong.status());
    }

    #[tokio::test]
    async fn forgot_password_unknown_email_is_not_found() {
        let h = harness();
        let err = service(&h)
            .forgot_password("ghost@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn forgot_password_stores_only_the_digest() {
        let h = harness();
        let svc = service(&h);
        let session = svc
            .register(registration("jane@example.com", "s3cret-pass", None))
            .await
            .unwrap();
        let before = OffsetDateTime::now_utc();
        svc.forgot_password("Jane@example.com").await.expect("forgot");

        let sent = h.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "jane@example.com");
        let raw = reset_token_in(&sent[0]);
        assert_eq!(raw.len(), 40);

        let stored = h.accounts.snapshot(session.account.id).unwrap();
        let reset = stored.reset.expect("reset digest stored");
        assert_ne!(reset.hash, raw);
        assert_eq!(reset.hash, digest_token(&raw));
        let ttl = reset.expires_at - before;
        assert!(ttl <= TimeDuration::minutes(30) + TimeDuration::seconds(5));
        assert!(ttl >= TimeDuration::minutes(29));
    }

    #[tokio::test]
    async fn reset_token_is_single_use() {
        let h = harness();
        let svc = service(&h);
        let session = svc
            .register(registration("jane@example.com", "s3cret-pass", None))
            .await
            .unwrap();
        svc.forgot_password("jane@example.com").await.unwrap();
        let raw = reset_token_in(&h.mailer.sent()[0]);

        let reset = svc
            .reset_password(&raw, "brand-new-pass", Some("brand-new-pass"))
            .await
            .expect("first reset");
        assert_eq!(reset.account.id, session.account.id);
        assert!(h.accounts.snapshot(session.account.id).unwrap().reset.is_none());
        svc.login(login("jane@example.com", "brand-new-pass"))
            .await
            .expect("login with new password");

        let err = svc
            .reset_password(&raw, "another-pass", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn expired_reset_token_is_rejected() {
        let h = harness();
        let svc = service(&h);
        let session = svc
            .register(registration("jane@example.com", "s3cret-pass", None))
            .await
            .unwrap();
        svc.forgot_password("jane@example.com").await.unwrap();
        let raw = reset_token_in(&h.mailer.sent()[0]);
        h.accounts
            .shift_reset_expiry(session.account.id, -TimeDuration::minutes(31));

        let err = svc
            .reset_password(&raw, "brand-new-pass", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidOrExpiredToken));
        svc.login(login("jane@example.com", "s3cret-pass"))
            .await
            .expect("old password still valid");
    }

    #[tokio::test]
    async fn weak_reset_password_leaves_token_usable() {
        let h = harness();
        let svc = service(&h);
        svc.register(registration("jane@example.com", "s3cret-pass", None))
            .await
            .unwrap();
        svc.forgot_password("jane@example.com").await.unwrap();
        let raw = reset_token_in(&h.mailer.sent()[0]);

        let err = svc.reset_password(&raw, "short", None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = svc
            .reset_password(&raw, "brand-new-pass", Some("different-pass"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        svc.reset_password(&raw, "brand-new-pass", None)
            .await
            .expect("token still valid");
    }

    #[tokio::test]
    async fn delivery_failure_rolls_back_digest() {
        let h = harness();
        let svc = service(&h);
        let session = svc
            .register(registration("jane@example.com", "s3cret-pass", None))
            .await
            .unwrap();
        h.mailer.set_failing(true);

        let err = svc.forgot_password("jane@example.com").await.unwrap_err();
        assert!(matches!(err, AppError::Delivery(_)));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_GATEWAY);
        assert!(h.accounts.snapshot(session.account.id).unwrap().reset.is_none());
    }

    #[tokio::test]
    async fn failed_rollback_still_reports_delivery_error() {
        let h = harness();
        let svc = service(&h);
        svc.register(registration("jane@example.com", "s3cret-pass", None))
            .await
            .unwrap();
        h.mailer.set_failing(true);
        h.accounts.fail_reset_clears(true);

        let err = svc.forgot_password("jane@example.com").await.unwrap_err();
        assert!(matches!(err, AppError::Delivery(_)));
    }

    #[tokio::test]
    async fn update_password_checks_current_password() {
        let h = harness();
        let svc = service(&h);
        let session = svc
            .register(registration("jane@example.com", "s3cret-pass", None))
            .await
            .unwrap();

        let err = svc
            .update_password(
                &session.account,
                UpdatePasswordRequest {
                    current_password: "not-it-at-all".into(),
                    new_password: "brand-new-pass".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));

        let updated = svc
            .update_password(
                &session.account,
                UpdatePasswordRequest {
                    current_password: "s3cret-pass".into(),
                    new_password: "brand-new-pass".into(),
                },
            )
            .await
            .expect("update password");
        assert!(!updated.token.is_empty());
        svc.login(login("jane@example.com", "brand-new-pass"))
            .await
            .expect("login with new password");
    }

    #[tokio::test]
    async fn profile_update_and_delete() {
        let h = harness();
        let svc = service(&h);
        let jane = svc
            .register(registration("jane@example.com", "s3cret-pass", None))
            .await
            .unwrap();
        svc.register(registration("john@example.com", "s3cret-pass", None))
            .await
            .unwrap();

        let renamed = svc
            .update_profile(
                &jane.account,
                UpdateProfileRequest {
                    name: Some("Jane Roe".into()),
                    email: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Jane Roe");
        assert_eq!(renamed.email, "jane@example.com");

        let err = svc
            .update_profile(
                &jane.account,
                UpdateProfileRequest {
                    name: None,
                    email: Some("John@example.com".into()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        svc.delete_account(&jane.account).await.unwrap();
        assert!(h.accounts.snapshot(jane.account.id).is_none());
    }
}
