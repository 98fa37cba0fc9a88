use crate::accounts::{AccountSummary, LoginRequest, SignupRequest};
use crate::error::ApiErrorBody;
use crate::models::{
    AuthorSummary, Bio, CommentView, DobVisibility, Gender, MediaItem, MediaKind, PostView, PrivacySettings, ReplyView,
    UpdateUser, User,
};
use crate::routes::{
    AuthResponse, CommentRequest, CreatePostRequest, DeleteMediaRequest, LikeResponse, MessageResponse, OptimizeResponse,
    PictureResponse, PostsPage, UpdatePostRequest, UploadResponse, UserPosts,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::signup,
        crate::routes::login,
        crate::routes::logout,
        crate::routes::get_user,
        crate::routes::update_user,
        crate::routes::list_posts,
        crate::routes::create_post,
        crate::routes::my_posts,
        crate::routes::posts_by_user,
        crate::routes::get_post,
        crate::routes::update_post,
        crate::routes::delete_post,
        crate::routes::toggle_like,
        crate::routes::add_comment,
        crate::routes::upload_media,
        crate::routes::upload_profile_picture,
        crate::routes::optimize_image,
        crate::routes::delete_media,
    ),
    components(schemas(
        User, Bio, Gender, DobVisibility, PrivacySettings, UpdateUser,
        AuthorSummary, MediaItem, MediaKind, PostView, CommentView, ReplyView,
        SignupRequest, LoginRequest, AccountSummary, AuthResponse, MessageResponse,
        PostsPage, UserPosts, CreatePostRequest, UpdatePostRequest, LikeResponse, CommentRequest,
        UploadResponse, PictureResponse, OptimizeResponse, DeleteMediaRequest, ApiErrorBody
    )),
    tags(
        (name = "auth", description = "Signup, login and profile"),
        (name = "posts", description = "Posts, likes and comments"),
        (name = "upload", description = "Media upload and management"),
    )
)]
pub struct ApiDoc;
