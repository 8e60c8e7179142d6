//! Account handlers: registration, activation, login and password flows.
//!
//! Activation and password reset hand out opaque tokens of the form `"{token_id}.{secret}"`.
//! Only an argon2 hash of the secret (and of the reset verify code) is stored.

use std::time::Duration;

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderName, StatusCode, header},
};
use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::{
    AppState,
    api::models::{
        organizations::OrganizationResponse,
        response::ResponseData,
        users::{
            ActivateQuery, ChangePasswordRequest, CurrentUser, FindType, ForgetPasswordQuery, LoginRequest, RegisterRequest,
            ResetPasswordRequest, SearchUsersQuery, SendMailQuery, UserBaseInfo, UserProfile, UserUpdateRequest,
        },
    },
    auth::{
        password::{self, Argon2Params},
        session,
    },
    db::{
        errors::DbError,
        handlers::{Organizations, Repository, UserTokens, Users},
        models::{
            organizations::{OrganizationCreateDBRequest, OrganizationDBResponse, OrganizationFilter},
            user_tokens::{TokenPurpose, UserTokenCreateDBRequest, UserTokenDBResponse},
            users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
        },
    },
    email::EmailService,
    errors::{Error, Result},
    types::{UserId, abbrev_uuid},
};

/// Maximum number of users returned by a search.
const SEARCH_LIMIT: i64 = 20;

const MAX_USERNAME_LENGTH: usize = 64;

/// Wrong verify codes a password reset token survives.
const MAX_VERIFY_ATTEMPTS: i64 = 5;

/// Response carrying a fresh session token in the `Authorization` header.
type WithSession<T> = ([(HeaderName, String); 1], ResponseData<T>);

fn with_session<T>(token: String, data: T) -> WithSession<T> {
    ([(header::AUTHORIZATION, token)], ResponseData::success(data))
}

fn invalid_token() -> Error {
    Error::BadRequest {
        message: "Invalid or expired token".to_string(),
    }
}

fn invalid_credentials() -> Error {
    Error::Unauthenticated {
        message: Some("Invalid username or password".to_string()),
    }
}

fn validate_registration(request: &RegisterRequest) -> Result<()> {
    let username = request.username.trim();
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(Error::BadRequest {
            message: format!("Username must be between 1 and {MAX_USERNAME_LENGTH} characters"),
        });
    }
    if username.contains(char::is_whitespace) || username.contains('@') {
        return Err(Error::BadRequest {
            message: "Username must not contain whitespace or '@'".to_string(),
        });
    }

    let email = request.email.trim();
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
    if !valid_email || email.contains(char::is_whitespace) {
        return Err(Error::BadRequest {
            message: "Invalid email address".to_string(),
        });
    }
    Ok(())
}

/// Pick a free organization name for a new user's personal org.
async fn personal_org_name(conn: &mut SqliteConnection, user: &UserDBResponse) -> Result<String> {
    let mut orgs = Organizations::new(conn);
    if !orgs.name_exists(&user.username).await? {
        return Ok(user.username.clone());
    }
    Ok(format!("{}-{}", user.username, abbrev_uuid(&user.id)))
}

/// Create the personal org under `name`, falling back to a random suffix if the name was taken
/// after it was picked.
async fn create_personal_org(conn: &mut SqliteConnection, user: &UserDBResponse, name: String) -> Result<OrganizationDBResponse> {
    let request = |name: String| OrganizationCreateDBRequest {
        name,
        description: None,
        avatar: None,
        created_by: user.id,
    };

    match Organizations::new(conn).create(&request(name)).await {
        Err(DbError::UniqueViolation { .. }) => {
            let fallback = format!("{}-{}", user.username, abbrev_uuid(&Uuid::new_v4()));
            tracing::debug!(name = %fallback, "Personal organization name taken, retrying");
            Ok(Organizations::new(conn).create(&request(fallback)).await?)
        }
        created => Ok(created?),
    }
}

/// Store a new single-use token, replacing any outstanding token of the same purpose.
pub(crate) async fn issue_token(
    conn: &mut SqliteConnection,
    user_id: UserId,
    purpose: TokenPurpose,
    verify_code: Option<&str>,
    ttl: Duration,
    params: Argon2Params,
) -> Result<String> {
    let id = Uuid::new_v4();
    let secret = password::generate_token();
    let token_hash = password::hash(secret.clone(), params).await?;
    let verify_code_hash = match verify_code {
        Some(code) => Some(password::hash(code.to_string(), params).await?),
        None => None,
    };

    let mut tokens = UserTokens::new(conn);
    tokens.invalidate_for_user(user_id, purpose).await?;
    tokens
        .create(&UserTokenCreateDBRequest {
            id,
            user_id,
            purpose,
            token_hash,
            verify_code_hash,
            expires_at: Utc::now() + ttl,
        })
        .await?;

    Ok(format!("{id}.{secret}"))
}

/// Resolve an opaque token to its live row. Every failure looks the same to the caller.
async fn find_live_token(conn: &mut SqliteConnection, opaque: &str, purpose: TokenPurpose) -> Result<UserTokenDBResponse> {
    let (id, secret) = opaque.trim().split_once('.').ok_or_else(invalid_token)?;
    let id = Uuid::parse_str(id).map_err(|_| invalid_token())?;

    let token = UserTokens::new(conn)
        .get_by_id(id)
        .await?
        .filter(|t| t.purpose == purpose && t.is_live(Utc::now()))
        .ok_or_else(invalid_token)?;

    if !password::verify(secret.to_string(), token.token_hash.clone()).await? {
        return Err(invalid_token());
    }
    Ok(token)
}

async fn issue_activation(state: &AppState, conn: &mut SqliteConnection, user: &UserDBResponse) -> Result<String> {
    let native = &state.config.auth.native;
    issue_token(
        conn,
        user.id,
        TokenPurpose::Activation,
        None,
        native.activation_token_duration,
        Argon2Params::from(&native.password),
    )
    .await
}

/// Mail a token issued in an already committed transaction. On failure the token is revoked
/// before the send error is returned.
async fn mail_token_or_revoke<F>(state: &AppState, user_id: UserId, purpose: TokenPurpose, send: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let Err(send_err) = send.await else {
        return Ok(());
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    UserTokens::new(&mut conn).invalidate_for_user(user_id, purpose).await?;
    Err(send_err)
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/users/register",
    request_body = RegisterRequest,
    tag = "users",
    responses(
        (status = 201, description = "User registered", body = ResponseData<bool>),
        (status = 400, description = "Invalid username, email or password, or registration disabled"),
        (status = 409, description = "Username or email already taken"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<(StatusCode, ResponseData<bool>)> {
    let native = &state.config.auth.native;
    if !native.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    validate_registration(&request)?;
    password::validate_password(&request.password, &native.password)?;
    let password_hash = password::hash(request.password, Argon2Params::from(&native.password)).await?;

    let email = EmailService::new(&state.config)?;
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let user = Users::new(&mut tx)
        .create(&UserCreateDBRequest::registration(
            request.username.trim().to_string(),
            request.email.trim().to_string(),
            password_hash,
            !native.require_activation,
        ))
        .await?;

    let org_name = personal_org_name(&mut tx, &user).await?;
    let org = create_personal_org(&mut tx, &user, org_name).await?;

    let activation = match native.require_activation {
        true => Some(issue_activation(&state, &mut tx, &user).await?),
        false => None,
    };

    // Mail goes out after the commit so no write lock is held across the send
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    if let Some(token) = activation
        && let Err(send_err) = email
            .send_activation_email(&user.email, user.name.as_deref(), &token, native.activation_token_duration)
            .await
    {
        // Undo the registration so the username and email stay free
        let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
        Organizations::new(&mut tx).delete(org.id).await?;
        Users::new(&mut tx).delete(user.id).await?;
        tx.commit().await.map_err(|e| Error::Database(e.into()))?;
        tracing::warn!(user_id = %abbrev_uuid(&user.id), "Activation mail failed, registration removed");
        return Err(send_err);
    }

    tracing::info!(user_id = %abbrev_uuid(&user.id), "User registered");

    Ok((StatusCode::CREATED, ResponseData::success(true)))
}

/// Search users by username, email or name
#[utoipa::path(
    get,
    path = "/users/search",
    tag = "users",
    params(SearchUsersQuery),
    responses(
        (status = 200, description = "Matching users", body = ResponseData<Vec<UserBaseInfo>>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<SearchUsersQuery>,
    _current_user: CurrentUser,
) -> Result<ResponseData<Vec<UserBaseInfo>>> {
    let keyword = query.keyword.trim();
    if keyword.is_empty() {
        return Ok(ResponseData::success(Vec::new()));
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let users = Users::new(&mut conn).search(keyword, SEARCH_LIMIT).await?;

    Ok(ResponseData::success(users.into_iter().map(UserBaseInfo::from).collect()))
}

/// The current user's profile, including their organizations
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    responses(
        (status = 200, description = "Profile of the current user", body = ResponseData<UserProfile>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_profile(State(state): State<AppState>, current_user: CurrentUser) -> Result<ResponseData<UserProfile>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let user = Users::new(&mut conn)
        .get_by_id(current_user.id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: current_user.id.to_string(),
        })?;

    let orgs = Organizations::new(&mut conn)
        .list(&OrganizationFilter {
            member_id: Some(current_user.id),
            skip: 0,
            limit: i64::MAX,
        })
        .await?;

    Ok(ResponseData::success(UserProfile::new(
        user,
        orgs.into_iter().map(OrganizationResponse::from).collect(),
    )))
}

/// Activate an account with the token from the activation mail
#[utoipa::path(
    get,
    path = "/users/active",
    tag = "users",
    params(ActivateQuery),
    responses(
        (status = 200, description = "Account activated. The session token is also in the Authorization header", body = ResponseData<String>),
        (status = 400, description = "Blank, invalid or expired token"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn activate(State(state): State<AppState>, Query(query): Query<ActivateQuery>) -> Result<WithSession<String>> {
    if query.token.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Activation token is required".to_string(),
        });
    }

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let token = find_live_token(&mut tx, &query.token, TokenPurpose::Activation).await?;
    if !UserTokens::new(&mut tx).mark_used(token.id).await? {
        return Err(invalid_token());
    }

    let user = Users::new(&mut tx)
        .update(
            token.user_id,
            &UserUpdateDBRequest {
                active: Some(true),
                ..Default::default()
            },
        )
        .await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    tracing::info!(user_id = %abbrev_uuid(&user.id), "User activated");

    let session_token = session::create_session_token(&CurrentUser::from(user), &state.config)?;
    Ok(with_session(session_token.clone(), session_token))
}

/// Re-send the activation mail
#[utoipa::path(
    post,
    path = "/users/sendmail",
    tag = "users",
    params(SendMailQuery),
    responses(
        (status = 200, description = "Activation mail sent", body = ResponseData<bool>),
        (status = 400, description = "Account already active"),
        (status = 404, description = "No such user"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn send_activation_mail(State(state): State<AppState>, Query(query): Query<SendMailQuery>) -> Result<ResponseData<bool>> {
    let principal = query.username_or_email.trim();
    let email = EmailService::new(&state.config)?;
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let user = Users::new(&mut tx)
        .get_user_by_username_or_email(principal)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: principal.to_string(),
        })?;

    if user.active {
        return Err(Error::BadRequest {
            message: "Account is already activated".to_string(),
        });
    }

    let token = issue_activation(&state, &mut tx, &user).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    let duration = state.config.auth.native.activation_token_duration;
    let send = email.send_activation_email(&user.email, user.name.as_deref(), &token, duration);
    mail_token_or_revoke(&state, user.id, TokenPurpose::Activation, send).await?;

    Ok(ResponseData::success(true))
}

/// Update the current user's profile
#[utoipa::path(
    put,
    path = "/users",
    request_body = UserUpdateRequest,
    tag = "users",
    responses(
        (status = 200, description = "Profile updated", body = ResponseData<UserBaseInfo>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<UserUpdateRequest>,
) -> Result<ResponseData<UserBaseInfo>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let user = Users::new(&mut conn)
        .update(
            current_user.id,
            &UserUpdateDBRequest {
                name: request.name,
                avatar: request.avatar,
                description: request.description,
                ..Default::default()
            },
        )
        .await?;

    Ok(ResponseData::success(UserBaseInfo::from(user)))
}

/// Change the current user's password
#[utoipa::path(
    put,
    path = "/users/change/password",
    request_body = ChangePasswordRequest,
    tag = "users",
    responses(
        (status = 200, description = "Password changed", body = ResponseData<bool>),
        (status = 400, description = "Old password incorrect or new password invalid"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<ResponseData<bool>> {
    let password_config = &state.config.auth.native.password;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);

    let user = users.get_by_id(current_user.id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: current_user.id.to_string(),
    })?;

    let old_matches = match user.password_hash {
        Some(hash) => password::verify(request.old_password, hash).await?,
        None => false,
    };
    if !old_matches {
        return Err(Error::BadRequest {
            message: "Old password is incorrect".to_string(),
        });
    }

    password::validate_password(&request.new_password, password_config)?;
    let password_hash = password::hash(request.new_password, Argon2Params::from(password_config)).await?;

    users
        .update(
            current_user.id,
            &UserUpdateDBRequest {
                password_hash: Some(password_hash),
                ..Default::default()
            },
        )
        .await?;

    Ok(ResponseData::success(true))
}

/// Start a password reset. A six digit verify code is mailed to the account.
#[utoipa::path(
    post,
    path = "/users/forget/password",
    tag = "users",
    params(ForgetPasswordQuery),
    responses(
        (status = 200, description = "Verify code sent. Returns the opaque reset token", body = ResponseData<String>),
        (status = 404, description = "No such user"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn forget_password(State(state): State<AppState>, Query(query): Query<ForgetPasswordQuery>) -> Result<ResponseData<String>> {
    let native = &state.config.auth.native;
    let principal = query.principal.trim();
    let email = EmailService::new(&state.config)?;
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let user = {
        let mut users = Users::new(&mut tx);
        match query.find_type {
            FindType::Email => users.get_user_by_email(principal).await?,
            FindType::Username => users.get_user_by_username(principal).await?,
        }
    }
    .ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: principal.to_string(),
    })?;

    let verify_code = password::generate_verify_code();
    let token = issue_token(
        &mut tx,
        user.id,
        TokenPurpose::PasswordReset,
        Some(&verify_code),
        native.password_reset_token_duration,
        Argon2Params::from(&native.password),
    )
    .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    let send = email.send_password_reset_email(&user.email, user.name.as_deref(), &verify_code, native.password_reset_token_duration);
    mail_token_or_revoke(&state, user.id, TokenPurpose::PasswordReset, send).await?;

    Ok(ResponseData::success(token))
}

/// Finish a password reset with the token and the mailed verify code
#[utoipa::path(
    put,
    path = "/users/reset/password",
    request_body = ResetPasswordRequest,
    tag = "users",
    responses(
        (status = 200, description = "Password reset", body = ResponseData<bool>),
        (status = 400, description = "Invalid token, wrong verify code or invalid password"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn reset_password(State(state): State<AppState>, Json(request): Json<ResetPasswordRequest>) -> Result<ResponseData<bool>> {
    let password_config = &state.config.auth.native.password;
    password::validate_password(&request.new_password, password_config)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let token = find_live_token(&mut conn, &request.token, TokenPurpose::PasswordReset).await?;
    let code_matches = match token.verify_code_hash.clone() {
        Some(hash) => password::verify(request.verify_code.trim().to_string(), hash).await?,
        None => false,
    };
    if !code_matches {
        let attempts = UserTokens::new(&mut conn)
            .record_failed_attempt(token.id, MAX_VERIFY_ATTEMPTS)
            .await?;
        tracing::warn!(token_id = %abbrev_uuid(&token.id), attempts, "Wrong password reset verify code");
        return Err(Error::BadRequest {
            message: "Verify code is incorrect".to_string(),
        });
    }
    drop(conn);

    let password_hash = password::hash(request.new_password, Argon2Params::from(password_config)).await?;
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    if !UserTokens::new(&mut tx).mark_used(token.id).await? {
        return Err(invalid_token());
    }

    Users::new(&mut tx)
        .update(
            token.user_id,
            &UserUpdateDBRequest {
                password_hash: Some(password_hash),
                ..Default::default()
            },
        )
        .await?;
    UserTokens::new(&mut tx)
        .invalidate_for_user(token.user_id, TokenPurpose::PasswordReset)
        .await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    tracing::info!(user_id = %abbrev_uuid(&token.user_id), "Password reset");

    Ok(ResponseData::success(true))
}

/// Log in with a username (or email) and password
#[utoipa::path(
    post,
    path = "/users/login",
    request_body = LoginRequest,
    tag = "users",
    responses(
        (status = 200, description = "Logged in. The session token is in the Authorization header", body = ResponseData<UserBaseInfo>),
        (status = 401, description = "Invalid credentials or account not activated"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<WithSession<UserBaseInfo>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);

    let user = users
        .get_user_by_username_or_email(request.username.trim())
        .await?
        .ok_or_else(invalid_credentials)?;

    let hash = user.password_hash.clone().ok_or_else(invalid_credentials)?;
    if !password::verify(request.password, hash).await? {
        return Err(invalid_credentials());
    }

    if !user.active {
        return Err(Error::Unauthenticated {
            message: Some("Account is not activated".to_string()),
        });
    }

    users.record_login(user.id).await?;

    let token = session::create_session_token(&CurrentUser::from(user.clone()), &state.config)?;
    Ok(with_session(token, UserBaseInfo::from(user)))
}

/// Log out. Sessions are stateless, so the client just drops its token.
#[utoipa::path(
    post,
    path = "/users/logout",
    tag = "users",
    responses(
        (status = 200, description = "Logged out", body = ResponseData<bool>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn logout(current_user: CurrentUser) -> Result<ResponseData<bool>> {
    tracing::debug!(user_id = %abbrev_uuid(&current_user.id), "User logged out");
    Ok(ResponseData::success(true))
}
