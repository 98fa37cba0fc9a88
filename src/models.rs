use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub type Id = Uuid;

// ---------------------------------------------------------------- users

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
    #[default]
    #[serde(rename = "")]
    Unset,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
            Gender::Unset => "",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            "" => Ok(Gender::Unset),
            other => Err(format!("unknown gender '{other}'")),
        }
    }
}

/// Who may see a user's date of birth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DobVisibility {
    #[default]
    Public,
    Followers,
    Private,
}

impl DobVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            DobVisibility::Public => "public",
            DobVisibility::Followers => "followers",
            DobVisibility::Private => "private",
        }
    }
}

impl FromStr for DobVisibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(DobVisibility::Public),
            "followers" => Ok(DobVisibility::Followers),
            "private" => Ok(DobVisibility::Private),
            other => Err(format!("unknown visibility '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PrivacySettings {
    #[serde(rename = "showDOB", default)]
    pub show_dob: DobVisibility,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Bio {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub emojis: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievements: Option<String>,
}

/// A user as stored and returned to clients. The password hash lives
/// beside it in the repository and is never part of this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id,
    pub full_name: String,
    pub email: String,
    pub profile_picture: String,
    pub cover_picture: String,
    pub bio: Bio,
    pub gender: Gender,
    pub date_of_birth: Option<NaiveDate>,
    pub privacy_settings: PrivacySettings,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
}

/// Fields a user may change on their own profile. Anything else in the
/// request body is ignored.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    pub full_name: Option<String>,
    pub bio: Option<Bio>,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<NaiveDate>,
    pub profile_picture: Option<String>,
    pub cover_picture: Option<String>,
    pub privacy_settings: Option<PrivacySettings>,
}

/// Which of the two profile images an upload targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureSlot {
    Profile,
    Cover,
}

impl PictureSlot {
    /// Parses the multipart / JSON `type` value (`profile` or `cover`).
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "profile" => Some(PictureSlot::Profile),
            "cover" => Some(PictureSlot::Cover),
            _ => None,
        }
    }
}

/// Display fields attached to every author reference in responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    pub id: Id,
    pub full_name: String,
    pub profile_picture: String,
}

impl AuthorSummary {
    fn unknown(id: Id) -> Self {
        Self { id, full_name: String::new(), profile_picture: String::new() }
    }
}

impl From<&User> for AuthorSummary {
    fn from(u: &User) -> Self {
        Self { id: u.id, full_name: u.full_name.clone(), profile_picture: u.profile_picture.clone() }
    }
}

// ---------------------------------------------------------------- posts

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Guess from a URL's extension; unknown extensions count as images.
    pub fn from_url(url: &str) -> Self {
        let ext = url.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase()).unwrap_or_default();
        match ext.as_str() {
            "mp4" | "mov" | "webm" | "m4v" => MediaKind::Video,
            _ => MediaKind::Image,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MediaItem {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: String,
}

// Clients may send either `{type, url}` objects or bare URL strings.
impl<'de> Deserialize<'de> for MediaItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Full {
            #[serde(rename = "type")]
            kind: Option<MediaKind>,
            url: String,
        }
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Url(String),
            Full(Full),
        }
        Ok(match Wire::deserialize(deserializer)? {
            Wire::Url(url) => MediaItem { kind: MediaKind::from_url(&url), url },
            Wire::Full(f) => MediaItem { kind: f.kind.unwrap_or_else(|| MediaKind::from_url(&f.url)), url: f.url },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub author: Id,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Id,
    pub author: Id,
    pub content: String,
    pub replies: Vec<Reply>,
    pub created_at: DateTime<Utc>,
}

/// Post aggregate root: likes, comments and their replies are owned by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Id,
    pub author: Id,
    pub content: String,
    pub media: Vec<MediaItem>,
    pub likes: Vec<Id>,
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Every user id referenced anywhere in the aggregate.
    pub fn referenced_users(&self) -> Vec<Id> {
        let mut ids = vec![self.author];
        for c in &self.comments {
            ids.push(c.author);
            ids.extend(c.replies.iter().map(|r| r.author));
        }
        ids
    }
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author: Id,
    pub content: String,
    pub media: Vec<MediaItem>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePost {
    pub content: Option<String>,
    pub media: Option<Vec<MediaItem>>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub author: Id,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct NewReply {
    pub author: Id,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeToggle {
    pub liked: bool,
    pub count: i64,
}

// ---------------------------------------------------------------- views

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplyView {
    pub author: AuthorSummary,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: Id,
    pub author: AuthorSummary,
    pub content: String,
    pub replies: Vec<ReplyView>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: Id,
    pub author: AuthorSummary,
    pub content: String,
    pub media: Vec<MediaItem>,
    pub likes: Vec<Id>,
    pub comments: Vec<CommentView>,
    pub created_at: DateTime<Utc>,
}

pub type Authors = HashMap<Id, AuthorSummary>;

fn author(authors: &Authors, id: Id) -> AuthorSummary {
    authors.get(&id).cloned().unwrap_or_else(|| AuthorSummary::unknown(id))
}

impl ReplyView {
    pub fn populate(reply: Reply, authors: &Authors) -> Self {
        Self { author: author(authors, reply.author), content: reply.content, created_at: reply.created_at }
    }
}

impl CommentView {
    pub fn populate(comment: Comment, authors: &Authors) -> Self {
        Self {
            id: comment.id,
            author: author(authors, comment.author),
            content: comment.content,
            replies: comment.replies.into_iter().map(|r| ReplyView::populate(r, authors)).collect(),
            created_at: comment.created_at,
        }
    }
}

impl PostView {
    pub fn populate(post: Post, authors: &Authors) -> Self {
        Self {
            id: post.id,
            author: author(authors, post.author),
            content: post.content,
            media: post.media,
            likes: post.likes,
            comments: post.comments.into_iter().map(|c| CommentView::populate(c, authors)).collect(),
            created_at: post.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_item_accepts_bare_urls_and_objects() {
        let items: Vec<MediaItem> = serde_json::from_str(
            r#"["/posts/a.jpg", {"type":"video","url":"/posts/b.mp4"}, {"url":"/posts/c.mov"}]"#,
        )
        .unwrap();
        assert_eq!(items[0], MediaItem { kind: MediaKind::Image, url: "/posts/a.jpg".into() });
        assert_eq!(items[1].kind, MediaKind::Video);
        assert_eq!(items[2].kind, MediaKind::Video);
    }

    #[test]
    fn gender_unset_serialises_as_empty_string() {
        assert_eq!(serde_json::to_string(&Gender::Unset).unwrap(), "\"\"");
        assert_eq!("".parse::<Gender>().unwrap(), Gender::Unset);
        assert!("robot".parse::<Gender>().is_err());
    }

    #[test]
    fn update_user_ignores_unknown_fields() {
        let upd: UpdateUser =
            serde_json::from_str(r#"{"fullName":"Bo","email":"evil@x.com","password":"x"}"#).unwrap();
        assert_eq!(upd.full_name.as_deref(), Some("Bo"));
        assert!(upd.profile_picture.is_none());
    }

    #[test]
    fn populate_falls_back_for_missing_authors() {
        let post = Post {
            id: Uuid::new_v4(),
            author: Uuid::new_v4(),
            content: "hi".into(),
            media: vec![],
            likes: vec![],
            comments: vec![],
            created_at: Utc::now(),
        };
        let view = PostView::populate(post.clone(), &Authors::new());
        assert_eq!(view.author.id, post.author);
        assert!(view.author.full_name.is_empty());
    }
}
