use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::header::SET_COOKIE,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, ProfileResponse,
            RegisterRequest, ResetPasswordRequest, UpdatePasswordRequest, UpdateProfileRequest,
        },
        extractors::CurrentUser,
        services::{AuthService, Session},
    },
    error::AppError,
    state::AppState,
};

const CLEARED_COOKIE: &str =
    "token=none; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/password/forgot", post(forgot_password))
        .route("/password/reset/:token", put(reset_password))
        .route("/password/update", put(update_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/me/update", put(update_me))
        .route("/me/delete", delete(delete_me))
}

fn session_cookie(auth: &AuthService, token: &str) -> String {
    let mut cookie = format!(
        "token={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        auth.session_ttl().as_secs()
    );
    if auth.secure_cookies() {
        cookie.push_str("; Secure");
    }
    cookie
}

/// JSON body plus the `token` cookie.
fn session_response(auth: &AuthService, session: Session) -> impl IntoResponse {
    let cookie = session_cookie(auth, &session.token);
    (
        [(SET_COOKIE, cookie)],
        Json(AuthResponse {
            success: true,
            token: session.token,
            user: session.account.into(),
        }),
    )
}

#[instrument(skip(auth, payload))]
pub async fn register(
    State(auth): State<AuthService>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    let session = auth.register(payload).await?;
    Ok((
        axum::http::StatusCode::CREATED,
        session_response(&auth, session),
    ))
}

#[instrument(skip(auth, payload))]
pub async fn login(
    State(auth): State<AuthService>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    let session = auth.login(payload).await?;
    Ok(session_response(&auth, session))
}

#[instrument]
pub async fn logout() -> impl IntoResponse {
    (
        [(SET_COOKIE, CLEARED_COOKIE)],
        Json(MessageResponse::ok("Logged out successfully.")),
    )
}

#[instrument(skip(auth, payload))]
pub async fn forgot_password(
    State(auth): State<AuthService>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(payload) = payload?;
    auth.forgot_password(&payload.email).await?;
    Ok(Json(MessageResponse::ok(format!(
        "Email sent to {}",
        payload.email.trim().to_lowercase()
    ))))
}

#[instrument(skip(auth, token, payload))]
pub async fn reset_password(
    State(auth): State<AuthService>,
    Path(token): Path<String>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    let session = auth
        .reset_password(
            &token,
            &payload.password,
            payload.confirm_password.as_deref(),
        )
        .await?;
    Ok(session_response(&auth, session))
}

#[instrument(skip(auth, caller, payload), fields(user_id = %caller.0.id))]
pub async fn update_password(
    State(auth): State<AuthService>,
    caller: CurrentUser,
    payload: Result<Json<UpdatePasswordRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    let session = auth.update_password(&caller.0, payload).await?;
    Ok(session_response(&auth, session))
}

#[instrument(skip(caller), fields(user_id = %caller.0.id))]
pub async fn get_me(caller: CurrentUser) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        success: true,
        data: caller.0.into(),
    })
}

#[instrument(skip(auth, caller, payload), fields(user_id = %caller.0.id))]
pub async fn update_me(
    State(auth): State<AuthService>,
    caller: CurrentUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<ProfileResponse>, AppError> {
    let Json(payload) = payload?;
    let account = auth.update_profile(&caller.0, payload).await?;
    Ok(Json(ProfileResponse {
        success: true,
        data: account.into(),
    }))
}

#[instrument(skip(auth, caller), fields(user_id = %caller.0.id))]
pub async fn delete_me(
    State(auth): State<AuthService>,
    caller: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    auth.delete_account(&caller.0).await?;
    Ok((
        [(SET_COOKIE, CLEARED_COOKIE)],
        Json(MessageResponse::ok("Your account has been deleted.")),
    ))
}
