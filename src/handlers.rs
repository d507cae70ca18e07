use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Multipart, Path, Query, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::error::ContentError;
use crate::listing::{build_listing, request_delete, Listing, ListingQuery};
use crate::model::{parse_tags, ContentItem, ContentPatch, ContentType, ImageUpload, NewContent};
use crate::server::AppState;
use crate::session::{clear_cookie, SessionState};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    /// Logged with its cause; only `message` reaches the client.
    Internal { message: &'static str, cause: String },
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Internal { message, cause } => {
                error!(%cause, "{message}");
                (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl ApiError {
    /// Map a library error, hiding internal causes behind `message`.
    fn from_content(err: ContentError, message: &'static str) -> Self {
        match err {
            ContentError::NotFound(id) => ApiError::NotFound(format!("Content {id} not found")),
            ContentError::ReadOnly(_)
            | ContentError::InvalidImage(_)
            | ContentError::Invalid(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal {
                message,
                cause: other.to_string(),
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// `Json` whose rejections answer with an `{error}` body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// `Query` whose rejections answer with an `{error}` body.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

/// `Path` whose rejections answer with an `{error}` body.
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

/// Signed-in admin, extracted from the session cookie.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub email: String,
}

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match state.gate.state(&parts.headers, Utc::now()) {
            SessionState::SignedIn { email } => Ok(Self { email }),
            SessionState::SignedOut => Err(ApiError::Unauthorized("Unauthorized".into())),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagsField {
    List(Vec<String>),
    Text(String),
}

impl Default for TagsField {
    fn default() -> Self {
        TagsField::List(Vec::new())
    }
}

impl TagsField {
    fn into_tags(self) -> Vec<String> {
        match self {
            TagsField::List(tags) => tags
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            TagsField::Text(raw) => parse_tags(&raw),
        }
    }
}

/// Authoring form as submitted. Every field is optional on the wire so that
/// missing and blank fields get the same answer.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContentForm {
    #[serde(rename = "type")]
    kind: String,
    title: String,
    content: String,
    excerpt: String,
    category: String,
    tags: TagsField,
    author: String,
    image_url: String,
    published: Option<bool>,
}

impl ContentForm {
    /// With `fill_defaults`, a blank excerpt or category takes the authoring
    /// default instead of failing.
    fn into_new(self, fill_defaults: bool) -> Result<NewContent, ApiError> {
        let mut required = vec![&self.kind, &self.title, &self.content, &self.author];
        if !fill_defaults {
            required.push(&self.excerpt);
            required.push(&self.category);
        }
        if required.into_iter().any(|f| f.trim().is_empty()) {
            return Err(ApiError::BadRequest("Missing required fields".into()));
        }
        let kind = ContentType::parse(self.kind.trim())
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown content type '{}'", self.kind)))?;
        let new = NewContent {
            kind,
            title: self.title,
            content: self.content,
            excerpt: self.excerpt,
            category: self.category,
            tags: self.tags.into_tags(),
            author: self.author,
            image_url: self.image_url,
            published: self.published.unwrap_or(true),
        };
        Ok(if fill_defaults { new.with_defaults() } else { new })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    #[serde(flatten)]
    patch: ContentPatch,
    #[serde(default)]
    delete_old_image: bool,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    confirm: bool,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
pub struct ContentResponse {
    success: bool,
    content: ContentItem,
}

impl ContentResponse {
    fn ok(content: ContentItem) -> Json<Self> {
        Json(Self {
            success: true,
            content,
        })
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn list_content(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListingQuery>,
) -> Json<Listing> {
    let items = if query.refresh {
        state.cache.refresh(&state.content).await
    } else {
        state.cache.current(&state.content).await
    };
    Json(build_listing(items, &query))
}

pub async fn get_content(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<ContentItem>, ApiError> {
    match state.content.find(&id).await {
        Some(item) if item.published => Ok(Json(item)),
        _ => Err(ApiError::NotFound("Content not found".into())),
    }
}

pub async fn admin_list(_admin: AdminSession, State(state): State<AppState>) -> Json<Vec<ContentItem>> {
    Json(state.content.list_remote().await)
}

pub async fn create_content(
    admin: AdminSession,
    State(state): State<AppState>,
    ApiJson(form): ApiJson<ContentForm>,
) -> Result<Json<ContentResponse>, ApiError> {
    let new = form.into_new(false)?;
    create(&state, &admin, new, None).await
}

pub async fn create_content_upload(
    admin: AdminSession,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ContentResponse>, ApiError> {
    let (item, image) = read_multipart(multipart?, "item").await?;
    let form: ContentForm = match item {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| ApiError::BadRequest(format!("Invalid item: {e}")))?,
        None => return Err(ApiError::BadRequest("Missing required fields".into())),
    };
    let new = form.into_new(true)?;
    create(&state, &admin, new, image).await
}

async fn create(
    state: &AppState,
    admin: &AdminSession,
    new: NewContent,
    image: Option<ImageUpload>,
) -> Result<Json<ContentResponse>, ApiError> {
    let created = state
        .content
        .create(new, image)
        .await
        .map_err(|e| ApiError::from_content(e, "Failed to create content"))?;
    state.cache.invalidate().await;
    info!(id = %created.id, admin = %admin.email, "content created");
    Ok(ContentResponse::ok(created))
}

pub async fn update_content(
    admin: AdminSession,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<UpdateRequest>,
) -> Result<Json<ContentResponse>, ApiError> {
    update(&state, &admin, &id, req, None).await
}

pub async fn update_content_upload(
    admin: AdminSession,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ContentResponse>, ApiError> {
    let (patch, image) = read_multipart(multipart?, "patch").await?;
    let req: UpdateRequest = match patch {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| ApiError::BadRequest(format!("Invalid patch: {e}")))?,
        None => UpdateRequest::default(),
    };
    update(&state, &admin, &id, req, image).await
}

async fn update(
    state: &AppState,
    admin: &AdminSession,
    id: &str,
    req: UpdateRequest,
    image: Option<ImageUpload>,
) -> Result<Json<ContentResponse>, ApiError> {
    let updated = state
        .content
        .update(id, req.patch, image, req.delete_old_image)
        .await
        .map_err(|e| ApiError::from_content(e, "Failed to update content"))?;
    state.cache.invalidate().await;
    info!(%id, admin = %admin.email, "content updated");
    Ok(ContentResponse::ok(updated))
}

pub async fn delete_content(
    admin: AdminSession,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiQuery(query): ApiQuery<DeleteQuery>,
) -> Result<Json<Value>, ApiError> {
    let pending = request_delete(id);
    if !query.confirm {
        return Err(ApiError::BadRequest(format!(
            "Deleting {} requires confirm=true",
            pending.id()
        )));
    }
    let id = pending.id().to_string();
    let deleted = pending
        .confirm(&state.content)
        .await
        .map_err(|e| ApiError::from_content(e, "Failed to delete content"))?;
    if !deleted {
        return Err(ApiError::NotFound("Content not found".into()));
    }
    state.cache.invalidate().await;
    info!(%id, admin = %admin.email, "content deleted");
    Ok(Json(json!({ "success": true })))
}

pub async fn sign_in(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SignInRequest>,
) -> Result<impl IntoResponse, ApiError> {
    match state.gate.sign_in(&req.email, &req.password, Utc::now()) {
        Ok(token) => {
            info!(email = %req.email, "admin signed in");
            let cookie = state.gate.cookie(&token, state.secure_cookies);
            Ok(([(header::SET_COOKIE, cookie)], Json(json!({ "success": true }))))
        }
        Err(err) => {
            warn!(email = %req.email, "rejected admin sign-in");
            Err(ApiError::Unauthorized(err.to_string()))
        }
    }
}

pub async fn check_auth(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    match state.gate.state(&headers, Utc::now()) {
        SessionState::SignedIn { email } => Ok(Json(json!({ "authenticated": true, "email": email }))),
        SessionState::SignedOut => Err(ApiError::Unauthorized("Not authenticated".into())),
    }
}

pub async fn sign_out(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, clear_cookie(state.secure_cookies))],
        Json(json!({ "success": true })),
    )
}

/// Read the JSON text part named `json_field` and an optional `image` file.
async fn read_multipart(
    mut multipart: Multipart,
    json_field: &str,
) -> Result<(Option<String>, Option<ImageUpload>), ApiError> {
    let bad = |e: axum::extract::multipart::MultipartError| ApiError::BadRequest(e.body_text());
    let mut json = None;
    let mut image = None;
    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == json_field {
            json = Some(field.text().await.map_err(bad)?);
        } else if name == "image" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await.map_err(bad)?;
            // Browsers send an empty part when no file was chosen.
            if file_name.is_empty() && bytes.is_empty() {
                continue;
            }
            image = Some(ImageUpload::new(file_name, content_type, bytes.to_vec()));
        }
    }
    Ok((json, image))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(v: Value) -> ContentForm {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn json_create_requires_every_field() {
        let full = json!({
            "type": "blog", "title": "T", "content": "C", "excerpt": "E",
            "category": "Strategic Planning", "author": "A", "tags": "a, b"
        });
        let new = form(full.clone()).into_new(false).unwrap();
        assert_eq!(new.tags, vec!["a", "b"]);
        assert!(new.published);

        let mut missing = full;
        missing["excerpt"] = json!("  ");
        match form(missing).into_new(false) {
            Err(ApiError::BadRequest(msg)) => assert_eq!(msg, "Missing required fields"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn upload_create_fills_defaults() {
        let new = form(json!({ "type": "insight", "title": "T", "content": "C", "author": "A" }))
            .into_new(true)
            .unwrap();
        assert_eq!(new.category, "Industry News");
        assert_eq!(new.excerpt, "C...");

        let unknown = form(json!({ "type": "memo", "title": "T", "content": "C", "author": "A" }));
        assert!(matches!(unknown.into_new(true), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn update_request_flattens_patch() {
        let req: UpdateRequest =
            serde_json::from_value(json!({ "title": "New", "deleteOldImage": true })).unwrap();
        assert!(req.delete_old_image);
        assert_eq!(req.patch, ContentPatch::title("New"));
    }

    #[test]
    fn library_errors_map_to_statuses() {
        let resp = ApiError::from_content(ContentError::NotFound("x".into()), "m").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = ApiError::from_content(ContentError::ReadOnly("static-1".into()), "m").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = ApiError::from_content(
            ContentError::Remote { status: 500, body: "boom".into() },
            "Failed to create content",
        )
        .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
