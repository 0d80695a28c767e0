use super::problem::ApiError;
use super::AppState;
use crate::auth::{AuthorizationKind, Authorizer, Principal};
use crate::error::ConfigServerError;
use crate::jwt::JsonWebToken;
use crate::secret::{check_client_id, generate_client_secret};
use crate::token::{create_token, detokenize, tokenize_counted};
use axum::body::Bytes;
use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const CLIENT_CREDENTIALS: &str = "client_credentials";
const BASIC_ONLY: &[AuthorizationKind] = &[AuthorizationKind::Basic];

fn authorization_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok())
}

fn outcome(err: &ConfigServerError) -> &'static str {
    match err {
        ConfigServerError::RepositoryNotFound(_) | ConfigServerError::FileNotFound(_) => {
            "not_found"
        }
        ConfigServerError::RepositoryUnavailable { .. } => "unavailable",
        err if err.is_authorization_failure() => "unauthorized",
        _ => "error",
    }
}

// ── Files ────────────────────────────────────────────────────────────────────

pub async fn git_file(
    State(state): State<AppState>,
    Path((repository, path)): Path<(String, String)>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, ApiError> {
    let authorizer = Authorizer::new(
        &state.settings.authorization,
        &state.keystore,
        state.settings.expiry_policy(),
    );
    let principal = authorizer
        .authorize(authorization_header(&headers))
        .map_err(|err| {
            state.metrics.record_file_request(&repository, outcome(&err));
            ApiError::from_error(&err, uri.path())
        })?;

    let result = match &principal {
        Principal::Anonymous => state.manager.get_unrestricted(&repository, &path).await,
        principal
            if state.manager.contains(&repository)
                && !principal.is_allowed_repository(&state.manager, &repository) =>
        {
            Err(ConfigServerError::ClientNotAllowed {
                client_id: principal.client_id().to_string(),
                repository: repository.clone(),
            })
        }
        principal => {
            state
                .manager
                .get(&repository, &path, principal.client_id())
                .await
        }
    };

    let content = result.map_err(|err| {
        state.metrics.record_file_request(&repository, outcome(&err));
        ApiError::from_error(&err, uri.path())
    })?;

    state.metrics.record_file_request(&repository, "ok");
    info!(repository = %repository, path = %path, client_id = %principal.client_id(), "file served");

    let plain = detokenize(&content, state.keystore.aes_key());
    Ok(([(CONTENT_TYPE, TEXT_PLAIN)], plain).into_response())
}

// ── OAuth2 ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
}

/// Client credentials grant; scopes the caller is not entitled to are dropped
pub async fn oauth2_authorize(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Result<Json<AccessTokenResponse>, ApiError> {
    let authorizer = Authorizer::new(
        BASIC_ONLY,
        &state.keystore,
        state.settings.expiry_policy(),
    );
    let principal = authorizer
        .authorize(authorization_header(&headers))
        .map_err(|err| ApiError::from_error(&err, uri.path()))?;

    let Form(request) =
        form.map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text(), uri.path()))?;

    if request.grant_type.as_deref() != Some(CLIENT_CREDENTIALS) {
        return Err(ApiError::bad_request(
            "unsupported grant type, only client_credentials is supported",
            uri.path(),
        ));
    }

    let requested: Vec<&str> = request
        .scope
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .collect();
    if requested.is_empty() {
        return Err(ApiError::bad_request("'scope' is required", uri.path()));
    }

    let client_id = principal.client_id();
    let mut granted: Vec<String> = Vec::new();
    for scope in requested {
        if state.manager.is_client_allowed(scope, client_id) && !granted.iter().any(|g| g == scope) {
            granted.push(scope.to_string());
        }
    }

    let jwt = JsonWebToken::new(
        &state.settings.issuer,
        client_id,
        granted.clone(),
        state.settings.token_validity(),
    )
    .map_err(|err| ApiError::from_error(&err, uri.path()))?;
    let access_token = jwt
        .pack(state.keystore.hmac_secret())
        .map_err(|err| ApiError::from_error(&err, uri.path()))?;

    state.metrics.access_token_issued();
    info!(client_id = %client_id, scope = ?granted, "access token issued");

    Ok(Json(AccessTokenResponse {
        access_token,
        token_type: "bearer".into(),
        expires_in: jwt.expires_in(),
        scope: granted.join(" "),
    }))
}

// ── API ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(rename = "clientID", default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    uri: Uri,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let Json(request) =
        body.map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text(), uri.path()))?;

    let client_id = request
        .client_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    check_client_id(&client_id).map_err(|err| ApiError::bad_request(err.to_string(), uri.path()))?;

    let client_secret = generate_client_secret(&client_id, state.keystore.aes_key())
        .map_err(|err| ApiError::from_error(&err, uri.path()))?;

    state.metrics.client_secret_issued();
    debug!(client_id = %client_id, "client secret generated");

    Ok(Json(RegisterResponse {
        client_id,
        client_secret,
    }))
}

/// Seal every `{enc:<plaintext>}` marker of a text document
pub async fn tokenize_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Result<Response, ApiError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("text") {
        return Err(ApiError::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("unsupported content type '{content_type}', only text/* is supported"),
            uri.path(),
        ));
    }

    let (sealed, count) = tokenize_counted(&body, state.keystore.aes_key())
        .map_err(|err| ApiError::from_error(&err, uri.path()))?;
    state.metrics.token_encrypted(count as u64);

    Ok(([(CONTENT_TYPE, TEXT_PLAIN)], sealed).into_response())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EncryptResponse {
    pub token: String,
}

/// Wrap the raw request body into a single substitution token
pub async fn encrypt(
    State(state): State<AppState>,
    uri: Uri,
    body: Bytes,
) -> Result<Json<EncryptResponse>, ApiError> {
    let token = create_token(&body, state.keystore.aes_key())
        .map_err(|err| ApiError::from_error(&err, uri.path()))?;

    state.metrics.token_encrypted(1);
    Ok(Json(EncryptResponse { token }))
}

pub async fn statistics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.manager.statistics())
}

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn metrics(State(state): State<AppState>, uri: Uri) -> Result<Response, ApiError> {
    let text = state
        .metrics
        .encode()
        .map_err(|err| ApiError::from_error(&err, uri.path()))?;
    Ok(([(CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response())
}

// ── Fallbacks ────────────────────────────────────────────────────────────────

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::new(
        StatusCode::NOT_FOUND,
        format!("no route for '{}'", uri.path()),
        uri.path(),
    )
}

pub async fn method_not_allowed(uri: Uri) -> ApiError {
    ApiError::new(
        StatusCode::METHOD_NOT_ALLOWED,
        "method not allowed for this resource",
        uri.path(),
    )
}
