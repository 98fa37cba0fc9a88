//! Post aggregate operations: owner checks, content rules and author
//! population sit here so handlers stay thin.

use crate::error::ApiError;
use crate::models::*;
use crate::repo::{Repo, RepoError, UserRepo};

/// Result of `add_comment`: a top-level comment or a reply to one.
#[derive(Debug, Clone)]
pub enum Added {
    Comment(CommentView),
    Reply(ReplyView),
}

fn post_not_found(e: RepoError) -> ApiError {
    match e {
        RepoError::NotFound => ApiError::not_found("Post not found"),
        other => other.into(),
    }
}

pub async fn populate(repo: &dyn Repo, posts: Vec<Post>) -> Result<Vec<PostView>, ApiError> {
    let mut ids: Vec<Id> = posts.iter().flat_map(Post::referenced_users).collect();
    ids.sort_unstable();
    ids.dedup();
    let authors = repo.author_summaries(&ids).await?;
    Ok(posts.into_iter().map(|p| PostView::populate(p, &authors)).collect())
}

pub async fn populate_one(repo: &dyn Repo, post: Post) -> Result<PostView, ApiError> {
    let mut views = populate(repo, vec![post]).await?;
    views.pop().ok_or(ApiError::Internal)
}

pub async fn get_post(repo: &dyn Repo, id: Id) -> Result<PostView, ApiError> {
    let post = repo.get_post(id).await.map_err(post_not_found)?;
    populate_one(repo, post).await
}

/// A post needs text or at least one media item.
pub async fn create_post(repo: &dyn Repo, author: Id, content: String, media: Vec<MediaItem>) -> Result<PostView, ApiError> {
    if content.is_empty() && media.is_empty() {
        return Err(ApiError::bad_request("Post must contain either text or media"));
    }
    let post = repo.create_post(NewPost { author, content, media }).await?;
    populate_one(repo, post).await
}

async fn owned_post(repo: &dyn Repo, caller: Id, id: Id, action: &str) -> Result<Post, ApiError> {
    let post = repo.get_post(id).await.map_err(post_not_found)?;
    if post.author != caller {
        return Err(ApiError::forbidden(format!("Not authorized to {action} this post")));
    }
    Ok(post)
}

/// Owner only. Empty content in the request leaves the content unchanged;
/// the result must still carry text or media.
pub async fn update_post(repo: &dyn Repo, caller: Id, id: Id, upd: UpdatePost) -> Result<PostView, ApiError> {
    let current = owned_post(repo, caller, id, "update").await?;
    let upd = UpdatePost { content: upd.content.filter(|c| !c.is_empty()), media: upd.media };

    let content_empty = upd.content.is_none() && current.content.is_empty();
    let media_empty = upd.media.as_ref().map_or(current.media.is_empty(), Vec::is_empty);
    if content_empty && media_empty {
        return Err(ApiError::bad_request("Post must contain either text or media"));
    }

    let post = repo.update_post(id, upd).await.map_err(post_not_found)?;
    populate_one(repo, post).await
}

/// Owner only. Likes, comments and replies go with the post.
pub async fn delete_post(repo: &dyn Repo, caller: Id, id: Id) -> Result<(), ApiError> {
    owned_post(repo, caller, id, "delete").await?;
    repo.delete_post(id).await.map_err(post_not_found)
}

pub async fn toggle_like(repo: &dyn Repo, post_id: Id, user: Id) -> Result<LikeToggle, ApiError> {
    repo.toggle_like(post_id, user).await.map_err(post_not_found)
}

/// Appends a comment, or a reply when `parent` names a comment of the post.
pub async fn add_comment(
    repo: &dyn Repo,
    post_id: Id,
    author: Id,
    content: String,
    parent: Option<Id>,
) -> Result<Added, ApiError> {
    repo.get_post(post_id).await.map_err(post_not_found)?;

    if content.is_empty() {
        return Err(ApiError::bad_request("Comment content is required"));
    }

    let authors = repo.author_summaries(&[author]).await?;
    match parent {
        Some(comment_id) => {
            let reply = repo
                .append_reply(post_id, comment_id, NewReply { author, content })
                .await
                .map_err(|e| match e {
                    RepoError::NotFound => ApiError::not_found("Parent comment not found"),
                    other => other.into(),
                })?;
            Ok(Added::Reply(ReplyView::populate(reply, &authors)))
        }
        None => {
            let comment = repo
                .append_comment(post_id, NewComment { author, content })
                .await
                .map_err(post_not_found)?;
            Ok(Added::Comment(CommentView::populate(comment, &authors)))
        }
    }
}
