use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::accounts::{self, AccountSummary, LoginRequest, SignupRequest};
use crate::auth::{Auth, TokenIssuer};
use crate::error::{ApiError, ApiErrorBody};
use crate::media::{self, MediaFolder, MediaPath, OptimizeOptions, UploadPolicy};
use crate::models::*;
use crate::multipart::Form;
use crate::posts::{self, Added};
use crate::repo::{PostRepo, Repo, RepoError};
use crate::storage::MediaStore;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ApiError::bad_request(format!("Invalid request body: {err}")).into()),
    )
    .app_data(web::PathConfig::default().error_handler(|_err, _req| ApiError::not_found("Resource not found").into()))
    .service(
        web::scope("/api")
            .service(web::resource("/auth/signup").route(web::post().to(signup)))
            .service(web::resource("/auth/login").route(web::post().to(login)))
            .service(web::resource("/auth/logout").route(web::post().to(logout)))
            .service(
                web::resource("/auth/user")
                    .route(web::get().to(get_user))
                    .route(web::patch().to(update_user)),
            )
            .service(
                web::resource("/posts")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            .service(web::resource("/posts/user").route(web::get().to(my_posts)))
            .service(web::resource("/posts/user/{id}").route(web::get().to(posts_by_user)))
            .service(
                web::resource("/posts/{id}")
                    .route(web::get().to(get_post))
                    .route(web::patch().to(update_post))
                    .route(web::delete().to(delete_post)),
            )
            .service(web::resource("/posts/{id}/like").route(web::post().to(toggle_like)))
            .service(web::resource("/posts/{id}/comment").route(web::post().to(add_comment)))
            .service(web::resource("/upload").route(web::post().to(upload_media)))
            .service(web::resource("/upload/profile").route(web::post().to(upload_profile_picture)))
            .service(web::resource("/upload/optimize").route(web::post().to(optimize_image)))
            .service(web::resource("/upload/delete").route(web::delete().to(delete_media))),
    );
    // Public media, served at the same paths the stored URLs carry.
    for folder in MediaFolder::ALL {
        cfg.route(
            &format!("/{}/{{file}}", folder.as_str()),
            web::get().to(move |data: web::Data<AppState>, path: web::Path<String>| serve_media(folder, data, path)),
        );
    }
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub media: Arc<dyn MediaStore>,
    pub tokens: Arc<TokenIssuer>,
}

// ---------------------------------------------------------------- bodies

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

fn message(text: &str) -> MessageResponse {
    MessageResponse { message: text.to_string() }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub success: bool,
    pub user: AccountSummary,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PageQuery {
    /// 1-based page number; defaults to 1.
    pub page: Option<String>,
    /// Page size; defaults to 10, at most 100.
    pub limit: Option<String>,
}

impl PageQuery {
    /// Lenient parse: missing, non-numeric or non-positive values fall back
    /// to the defaults.
    pub fn resolve(&self) -> (i64, i64) {
        let parse = |v: &Option<String>| v.as_deref().and_then(|s| s.trim().parse::<i64>().ok()).filter(|n| *n > 0);
        let page = parse(&self.page).unwrap_or(1);
        let limit = parse(&self.limit).unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
        (page, limit)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostsPage {
    pub posts: Vec<PostView>,
    pub current_page: i64,
    pub total_pages: i64,
    pub total_posts: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserPosts {
    pub posts: Vec<PostView>,
    pub user_id: Id,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media: Vec<MediaItem>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePostRequest {
    pub content: Option<String>,
    pub media: Option<Vec<MediaItem>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LikeResponse {
    pub message: String,
    pub liked: bool,
    pub likes: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    #[serde(default)]
    pub content: String,
    pub parent_comment_id: Option<Id>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PictureResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_picture: Option<String>,
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OptimizeResponse {
    pub message: String,
    pub filepath: String,
    pub size: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteMediaRequest {
    #[serde(default)]
    pub filepath: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

// ---------------------------------------------------------------- auth

fn signed_in(data: &AppState, user: &User, status: actix_web::http::StatusCode) -> Result<HttpResponse, ApiError> {
    let token = data.tokens.issue(user.id).map_err(|e| {
        log::error!("token issue failed: {e}");
        ApiError::Internal
    })?;
    Ok(HttpResponse::build(status)
        .cookie(data.tokens.cookie(token))
        .json(AuthResponse { success: true, user: AccountSummary::from(user) }))
}

#[utoipa::path(
    post,
    path = "/api/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created, auth cookie set", body = AuthResponse),
        (status = 400, description = "Missing fields, short password or email taken", body = ApiErrorBody)
    )
)]
pub async fn signup(data: web::Data<AppState>, payload: web::Json<SignupRequest>) -> Result<HttpResponse, ApiError> {
    let user = accounts::register(data.repo.as_ref(), payload.into_inner()).await?;
    signed_in(&data, &user, actix_web::http::StatusCode::CREATED)
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in, auth cookie set", body = AuthResponse),
        (status = 400, description = "Missing fields", body = ApiErrorBody),
        (status = 401, description = "Invalid credentials", body = ApiErrorBody)
    )
)]
pub async fn login(data: web::Data<AppState>, payload: web::Json<LoginRequest>) -> Result<HttpResponse, ApiError> {
    let user = accounts::login(data.repo.as_ref(), payload.into_inner()).await?;
    signed_in(&data, &user, actix_web::http::StatusCode::OK)
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses((status = 200, description = "Auth cookie cleared", body = MessageResponse))
)]
pub async fn logout(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(data.tokens.removal_cookie())
        .json(message("Logged out successfully"))
}

#[utoipa::path(
    get,
    path = "/api/auth/user",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Not signed in", body = ApiErrorBody),
        (status = 404, description = "User no longer exists", body = ApiErrorBody)
    )
)]
pub async fn get_user(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = accounts::current_user(data.repo.as_ref(), auth.0).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    patch,
    path = "/api/auth/user",
    request_body = UpdateUser,
    responses(
        (status = 200, description = "Updated user", body = User),
        (status = 400, description = "Invalid update", body = ApiErrorBody),
        (status = 401, description = "Not signed in", body = ApiErrorBody),
        (status = 404, description = "User no longer exists", body = ApiErrorBody)
    )
)]
pub async fn update_user(auth: Auth, data: web::Data<AppState>, payload: web::Json<UpdateUser>) -> Result<HttpResponse, ApiError> {
    let user = accounts::update_profile(data.repo.as_ref(), auth.0, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

// ---------------------------------------------------------------- posts

#[utoipa::path(
    get,
    path = "/api/posts",
    params(PageQuery),
    responses((status = 200, description = "Newest posts first", body = PostsPage))
)]
pub async fn list_posts(data: web::Data<AppState>, query: web::Query<PageQuery>) -> Result<HttpResponse, ApiError> {
    let (page, limit) = query.resolve();
    let offset = (page - 1).saturating_mul(limit);
    let total = data.repo.count_posts().await?;
    let rows = data.repo.list_posts(offset, limit).await?;
    let posts = posts::populate(data.repo.as_ref(), rows).await?;
    Ok(HttpResponse::Ok().json(PostsPage {
        posts,
        current_page: page,
        total_pages: (total + limit - 1) / limit,
        total_posts: total,
    }))
}

#[utoipa::path(
    post,
    path = "/api/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = PostView),
        (status = 400, description = "Neither text nor media", body = ApiErrorBody),
        (status = 401, description = "Not signed in", body = ApiErrorBody)
    )
)]
pub async fn create_post(auth: Auth, data: web::Data<AppState>, payload: web::Json<CreatePostRequest>) -> Result<HttpResponse, ApiError> {
    let CreatePostRequest { content, media } = payload.into_inner();
    let post = posts::create_post(data.repo.as_ref(), auth.0, content, media).await?;
    Ok(HttpResponse::Created().json(post))
}

#[utoipa::path(
    get,
    path = "/api/posts/user",
    responses(
        (status = 200, description = "Caller's posts, newest first", body = UserPosts),
        (status = 401, description = "Not signed in", body = ApiErrorBody)
    )
)]
pub async fn my_posts(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let rows = data.repo.list_posts_by_author(auth.0).await?;
    let posts = posts::populate(data.repo.as_ref(), rows).await?;
    Ok(HttpResponse::Ok().json(UserPosts { posts, user_id: auth.0 }))
}

#[utoipa::path(
    get,
    path = "/api/posts/user/{id}",
    params(("id" = Id, Path, description = "Author id")),
    responses((status = 200, description = "Author's posts, newest first", body = [PostView]))
)]
pub async fn posts_by_user(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let rows = data.repo.list_posts_by_author(path.into_inner()).await?;
    let posts = posts::populate(data.repo.as_ref(), rows).await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post", body = PostView),
        (status = 404, description = "Post not found", body = ApiErrorBody)
    )
)]
pub async fn get_post(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let post = posts::get_post(data.repo.as_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    patch,
    path = "/api/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Updated post", body = PostView),
        (status = 400, description = "Update would leave the post empty", body = ApiErrorBody),
        (status = 401, description = "Not signed in", body = ApiErrorBody),
        (status = 403, description = "Not the author", body = ApiErrorBody),
        (status = 404, description = "Post not found", body = ApiErrorBody)
    )
)]
pub async fn update_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdatePostRequest>,
) -> Result<HttpResponse, ApiError> {
    let UpdatePostRequest { content, media } = payload.into_inner();
    let post = posts::update_post(data.repo.as_ref(), auth.0, path.into_inner(), UpdatePost { content, media }).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post deleted", body = MessageResponse),
        (status = 401, description = "Not signed in", body = ApiErrorBody),
        (status = 403, description = "Not the author", body = ApiErrorBody),
        (status = 404, description = "Post not found", body = ApiErrorBody)
    )
)]
pub async fn delete_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    posts::delete_post(data.repo.as_ref(), auth.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(message("Post deleted successfully")))
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/like",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Like toggled", body = LikeResponse),
        (status = 401, description = "Not signed in", body = ApiErrorBody),
        (status = 404, description = "Post not found", body = ApiErrorBody)
    )
)]
pub async fn toggle_like(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let LikeToggle { liked, count } = posts::toggle_like(data.repo.as_ref(), path.into_inner(), auth.0).await?;
    let message = if liked { "Post liked" } else { "Post unliked" };
    Ok(HttpResponse::Ok().json(LikeResponse { message: message.to_string(), liked, likes: count }))
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/comment",
    params(("id" = Id, Path, description = "Post id")),
    request_body = CommentRequest,
    responses(
        (status = 201, description = "Comment, or reply when parentCommentId is given", body = CommentView),
        (status = 400, description = "Empty content", body = ApiErrorBody),
        (status = 401, description = "Not signed in", body = ApiErrorBody),
        (status = 404, description = "Post or parent comment not found", body = ApiErrorBody)
    )
)]
pub async fn add_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<CommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let CommentRequest { content, parent_comment_id } = payload.into_inner();
    match posts::add_comment(data.repo.as_ref(), path.into_inner(), auth.0, content, parent_comment_id).await? {
        Added::Comment(c) => Ok(HttpResponse::Created().json(c)),
        Added::Reply(r) => Ok(HttpResponse::Created().json(r)),
    }
}

// ---------------------------------------------------------------- media

#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content = String, content_type = "multipart/form-data", description = "One or more `media` parts"),
    responses(
        (status = 200, description = "Public URLs in upload order", body = UploadResponse),
        (status = 400, description = "Missing, invalid or oversized file", body = ApiErrorBody),
        (status = 401, description = "Not signed in", body = ApiErrorBody)
    )
)]
pub async fn upload_media(_auth: Auth, data: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    let policy = UploadPolicy::POST_MEDIA;
    let form = Form::read(payload, policy.max_bytes).await?;
    let files = form.files("media");
    if files.is_empty() {
        return Err(media::MediaError::Missing.into());
    }
    // Nothing is written unless every part passes.
    for upload in &files {
        media::validate(Some(upload), &policy)?;
    }
    let mut urls = Vec::with_capacity(files.len());
    for upload in files {
        let name = media::unique_file_name(&upload.file_name, &upload.bytes);
        urls.push(data.media.save(MediaFolder::Posts, &name, &upload.bytes).await?);
    }
    log::info!("stored {} post media file(s)", urls.len());
    Ok(HttpResponse::Ok().json(UploadResponse { urls }))
}

#[utoipa::path(
    post,
    path = "/api/upload/profile",
    request_body(content = String, content_type = "multipart/form-data", description = "`file` plus `type` = profile | cover"),
    responses(
        (status = 200, description = "Picture stored and user updated", body = PictureResponse),
        (status = 400, description = "Missing, invalid or oversized file, or bad type", body = ApiErrorBody),
        (status = 401, description = "Not signed in", body = ApiErrorBody),
        (status = 404, description = "User no longer exists", body = ApiErrorBody)
    )
)]
pub async fn upload_profile_picture(auth: Auth, data: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    let policy = UploadPolicy::PROFILE_IMAGE;
    let form = Form::read(payload, policy.max_bytes).await?;
    let upload = form.file("file");
    media::validate(upload, &policy)?;
    let slot = form
        .text("type")
        .and_then(PictureSlot::from_kind)
        .ok_or_else(|| ApiError::bad_request("Invalid upload type"))?;
    let upload = upload.ok_or(media::MediaError::Missing)?;

    let folder = match slot {
        PictureSlot::Profile => MediaFolder::ProfilePictures,
        PictureSlot::Cover => MediaFolder::CoverPictures,
    };
    let name = media::unique_file_name(&upload.file_name, &upload.bytes);
    let url = data.media.save(folder, &name, &upload.bytes).await?;
    let user = data.repo.set_picture(auth.0, slot, url.clone()).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::not_found("User not found"),
        other => other.into(),
    })?;

    let (profile_picture, cover_picture) = match slot {
        PictureSlot::Profile => (Some(url), None),
        PictureSlot::Cover => (None, Some(url)),
    };
    Ok(HttpResponse::Ok().json(PictureResponse {
        message: "Image uploaded successfully".to_string(),
        profile_picture,
        cover_picture,
        user,
    }))
}

#[utoipa::path(
    post,
    path = "/api/upload/optimize",
    request_body(content = String, content_type = "multipart/form-data", description = "`file`, `type`, optional `width`, `height`, `quality`"),
    responses(
        (status = 200, description = "Optimised image stored", body = OptimizeResponse),
        (status = 400, description = "Missing, invalid or oversized file, or a side above 4096 pixels", body = ApiErrorBody),
        (status = 401, description = "Not signed in", body = ApiErrorBody)
    )
)]
pub async fn optimize_image(_auth: Auth, data: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    let policy = UploadPolicy::OPTIMIZE_INPUT;
    let form = Form::read(payload, policy.max_bytes).await?;
    let upload = form.file("file");
    media::validate(upload, &policy)?;
    let upload = upload.ok_or(media::MediaError::Missing)?;

    let defaults = OptimizeOptions::default();
    let opts = OptimizeOptions {
        width: positive_or(form.number("width", defaults.width), defaults.width),
        height: positive_or(form.number("height", defaults.height), defaults.height),
        quality: positive_or(form.number("quality", defaults.quality), defaults.quality).min(100),
    };
    let folder = MediaFolder::for_kind(form.text("type"));

    let bytes = upload.bytes.clone();
    let optimized = web::block(move || media::optimize(&bytes, opts))
        .await
        .map_err(|e| {
            log::error!("optimise task failed: {e}");
            ApiError::Internal
        })??;

    let name = format!("{}.{}", uuid::Uuid::new_v4(), optimized.format.extension());
    let filepath = data.media.save(folder, &name, &optimized.bytes).await?;
    Ok(HttpResponse::Ok().json(OptimizeResponse {
        message: "Image optimized and saved successfully".to_string(),
        filepath,
        size: optimized.bytes.len(),
    }))
}

fn positive_or<T: PartialOrd + Default>(value: T, fallback: T) -> T {
    if value > T::default() { value } else { fallback }
}

#[utoipa::path(
    delete,
    path = "/api/upload/delete",
    request_body = DeleteMediaRequest,
    responses(
        (status = 200, description = "File removed (or already absent)", body = MessageResponse),
        (status = 400, description = "Missing path or folder outside the allow-list", body = ApiErrorBody),
        (status = 401, description = "Not signed in", body = ApiErrorBody)
    )
)]
pub async fn delete_media(auth: Auth, data: web::Data<AppState>, payload: web::Json<DeleteMediaRequest>) -> Result<HttpResponse, ApiError> {
    let DeleteMediaRequest { filepath, kind } = payload.into_inner();
    if filepath.trim().is_empty() {
        return Err(ApiError::bad_request("No file path provided"));
    }
    let target = MediaPath::parse(filepath.trim())?;
    data.media.delete(target.folder, &target.file_name).await?;

    if let Some(slot) = kind.as_deref().and_then(PictureSlot::from_kind) {
        match data.repo.set_picture(auth.0, slot, String::new()).await {
            Ok(_) | Err(RepoError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(HttpResponse::Ok().json(message("File deleted successfully")))
}

pub async fn serve_media(folder: MediaFolder, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let file = path.into_inner();
    let bytes = data.media.load(folder, &file).await?;
    let mime = infer::get(&bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into());
    Ok(HttpResponse::Ok().insert_header(("Content-Type", mime)).body(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(page: Option<&str>, limit: Option<&str>) -> PageQuery {
        PageQuery { page: page.map(str::to_string), limit: limit.map(str::to_string) }
    }

    #[test]
    fn page_query_defaults_and_clamps() {
        assert_eq!(q(None, None).resolve(), (1, 10));
        assert_eq!(q(Some("3"), Some("5")).resolve(), (3, 5));
        assert_eq!(q(Some("abc"), Some("-4")).resolve(), (1, 10));
        assert_eq!(q(Some("0"), Some("0")).resolve(), (1, 10));
        assert_eq!(q(Some("2"), Some("5000")).resolve(), (2, 100));
    }

    #[test]
    fn positive_or_falls_back_on_zero() {
        assert_eq!(positive_or(0u32, 800), 800);
        assert_eq!(positive_or(320u32, 800), 320);
        assert_eq!(positive_or(0u8, 80), 80);
    }
}
