use std::collections::HashMap;

use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Fails with `Conflict` when the (already normalised) email is taken.
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    /// User plus stored password hash, looked up by normalised email.
    async fn find_credentials(&self, email: &str) -> RepoResult<(User, String)>;
    async fn update_user(&self, id: Id, upd: UpdateUser) -> RepoResult<User>;
    async fn set_picture(&self, id: Id, slot: PictureSlot, url: String) -> RepoResult<User>;
    /// Display fields for each id that resolves; unknown ids are skipped.
    async fn author_summaries(&self, ids: &[Id]) -> RepoResult<Authors>;
}

/// Post aggregate storage. Likes, comments and replies are only ever
/// changed through the atomic operations below, never by saving a whole
/// loaded post back.
#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Newest first.
    async fn list_posts(&self, offset: i64, limit: i64) -> RepoResult<Vec<Post>>;
    async fn count_posts(&self) -> RepoResult<i64>;
    /// Newest first.
    async fn list_posts_by_author(&self, author: Id) -> RepoResult<Vec<Post>>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post>;
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
    async fn toggle_like(&self, post_id: Id, user_id: Id) -> RepoResult<LikeToggle>;
    async fn append_comment(&self, post_id: Id, new: NewComment) -> RepoResult<Comment>;
    /// `NotFound` when the post or the comment inside it does not exist.
    async fn append_reply(&self, post_id: Id, comment_id: Id, new: NewReply) -> RepoResult<Reply>;
}

pub trait Repo: UserRepo + PostRepo {}

impl<T> Repo for T where T: UserRepo + PostRepo {}

fn apply_user_update(user: &mut User, upd: UpdateUser) {
    if let Some(v) = upd.full_name { user.full_name = v; }
    if let Some(v) = upd.bio { user.bio = v; }
    if let Some(v) = upd.gender { user.gender = v; }
    if let Some(v) = upd.date_of_birth { user.date_of_birth = Some(v); }
    if let Some(v) = upd.profile_picture { user.profile_picture = v; }
    if let Some(v) = upd.cover_picture { user.cover_picture = v; }
    if let Some(v) = upd.privacy_settings { user.privacy_settings = v; }
}

pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
    use uuid::Uuid;

    const SNAPSHOT_FILE: &str = "state.json";

    #[derive(Clone, Serialize, Deserialize)]
    struct StoredUser {
        user: User,
        password_hash: String,
    }

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, StoredUser>,
        /// Insertion order; listings walk it backwards.
        posts: Vec<Post>,
    }

    impl State {
        fn post_mut(&mut self, id: Id) -> RepoResult<&mut Post> {
            self.posts.iter_mut().find(|p| p.id == id).ok_or(RepoError::NotFound)
        }
    }

    /// Whole-state store guarded by one lock. Every mutation happens inside
    /// a single write critical section, which makes each of them atomic.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        /// Ephemeral store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Store backed by `<dir>/state.json`, loaded now and rewritten
        /// after every mutation. The file is replaced by renaming a fully
        /// written temp file. Snapshotting is best effort: a failed write
        /// is logged and the mutation still succeeds in memory.
        pub fn with_snapshot(dir: &Path) -> Self {
            let path = dir.join(SNAPSHOT_FILE);
            let state = Self::load_state_from(&path);
            Self { state: Arc::new(RwLock::new(state)), snapshot_path: Some(Arc::new(path)) }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(e) => {
                    log::info!("no snapshot at '{}' ({e}); starting empty", path.display());
                    State::default()
                }
            }
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        /// Called with the write guard still held so snapshots never interleave.
        fn persist(&self, state: &State) {
            let Some(path) = self.snapshot_path.as_deref() else { return };
            match serde_json::to_vec_pretty(state) {
                Ok(bytes) => {
                    if let Some(dir) = path.parent() {
                        if let Err(e) = std::fs::create_dir_all(dir) {
                            log::error!("failed to create snapshot dir '{}': {e}", dir.display());
                        }
                    }
                    let tmp = path.with_extension("json.tmp");
                    if let Err(e) = std::fs::write(&tmp, bytes).and_then(|()| std::fs::rename(&tmp, path)) {
                        log::error!("failed to write snapshot '{}': {e}", path.display());
                    }
                }
                Err(e) => log::error!("failed to serialise snapshot: {e}"),
            }
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.write()?;
            if s.users.values().any(|u| u.user.email == new.email) {
                return Err(RepoError::Conflict);
            }
            let user = User {
                id: Uuid::new_v4(),
                full_name: new.full_name,
                email: new.email,
                profile_picture: String::new(),
                cover_picture: String::new(),
                bio: Bio::default(),
                gender: Gender::default(),
                date_of_birth: None,
                privacy_settings: PrivacySettings::default(),
                created_at: Utc::now(),
            };
            s.users.insert(user.id, StoredUser { user: user.clone(), password_hash: new.password_hash });
            self.persist(&s);
            Ok(user)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.read()?;
            s.users.get(&id).map(|u| u.user.clone()).ok_or(RepoError::NotFound)
        }

        async fn find_credentials(&self, email: &str) -> RepoResult<(User, String)> {
            let s = self.read()?;
            s.users
                .values()
                .find(|u| u.user.email == email)
                .map(|u| (u.user.clone(), u.password_hash.clone()))
                .ok_or(RepoError::NotFound)
        }

        async fn update_user(&self, id: Id, upd: UpdateUser) -> RepoResult<User> {
            let mut s = self.write()?;
            let stored = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
            apply_user_update(&mut stored.user, upd);
            let updated = stored.user.clone();
            self.persist(&s);
            Ok(updated)
        }

        async fn set_picture(&self, id: Id, slot: PictureSlot, url: String) -> RepoResult<User> {
            let mut s = self.write()?;
            let stored = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
            match slot {
                PictureSlot::Profile => stored.user.profile_picture = url,
                PictureSlot::Cover => stored.user.cover_picture = url,
            }
            let updated = stored.user.clone();
            self.persist(&s);
            Ok(updated)
        }

        async fn author_summaries(&self, ids: &[Id]) -> RepoResult<Authors> {
            let s = self.read()?;
            Ok(ids
                .iter()
                .filter_map(|id| s.users.get(id))
                .map(|u| (u.user.id, AuthorSummary::from(&u.user)))
                .collect())
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn list_posts(&self, offset: i64, limit: i64) -> RepoResult<Vec<Post>> {
            let s = self.read()?;
            let skip = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
            let take = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
            Ok(s.posts.iter().rev().skip(skip).take(take).cloned().collect())
        }

        async fn count_posts(&self) -> RepoResult<i64> {
            let s = self.read()?;
            Ok(s.posts.len() as i64)
        }

        async fn list_posts_by_author(&self, author: Id) -> RepoResult<Vec<Post>> {
            let s = self.read()?;
            Ok(s.posts.iter().rev().filter(|p| p.author == author).cloned().collect())
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let s = self.read()?;
            s.posts.iter().find(|p| p.id == id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let mut s = self.write()?;
            let post = Post {
                id: Uuid::new_v4(),
                author: new.author,
                content: new.content,
                media: new.media,
                likes: Vec::new(),
                comments: Vec::new(),
                created_at: Utc::now(),
            };
            s.posts.push(post.clone());
            self.persist(&s);
            Ok(post)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let mut s = self.write()?;
            let post = s.post_mut(id)?;
            if let Some(content) = upd.content { post.content = content; }
            if let Some(media) = upd.media { post.media = media; }
            let updated = post.clone();
            self.persist(&s);
            Ok(updated)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            let before = s.posts.len();
            s.posts.retain(|p| p.id != id);
            if s.posts.len() == before {
                return Err(RepoError::NotFound);
            }
            self.persist(&s);
            Ok(())
        }

        async fn toggle_like(&self, post_id: Id, user_id: Id) -> RepoResult<LikeToggle> {
            let mut s = self.write()?;
            let post = s.post_mut(post_id)?;
            let liked = if post.likes.contains(&user_id) {
                post.likes.retain(|u| *u != user_id);
                false
            } else {
                post.likes.push(user_id);
                true
            };
            let count = post.likes.len() as i64;
            self.persist(&s);
            Ok(LikeToggle { liked, count })
        }

        async fn append_comment(&self, post_id: Id, new: NewComment) -> RepoResult<Comment> {
            let mut s = self.write()?;
            let post = s.post_mut(post_id)?;
            let comment = Comment {
                id: Uuid::new_v4(),
                author: new.author,
                content: new.content,
                replies: Vec::new(),
                created_at: Utc::now(),
            };
            post.comments.push(comment.clone());
            self.persist(&s);
            Ok(comment)
        }

        async fn append_reply(&self, post_id: Id, comment_id: Id, new: NewReply) -> RepoResult<Reply> {
            let mut s = self.write()?;
            let post = s.post_mut(post_id)?;
            let comment = post.comments.iter_mut().find(|c| c.id == comment_id).ok_or(RepoError::NotFound)?;
            let reply = Reply { author: new.author, content: new.content, created_at: Utc::now() };
            comment.replies.push(reply.clone());
            self.persist(&s);
            Ok(reply)
        }
    }
}

pub mod pg {
    use super::*;
    use chrono::{DateTime, NaiveDate, Utc};
    use sqlx::types::Json;
    use sqlx::{FromRow, Pool, Postgres};
    use uuid::Uuid;

    const USER_COLUMNS: &str = "id, full_name, email, profile_picture, cover_picture, bio, gender, date_of_birth, show_dob, created_at";
    const POST_COLUMNS: &str = "id, author_id, content, media, created_at";

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.to_string())
    }

    fn not_found_or_internal(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(ref d) if d.is_foreign_key_violation() => RepoError::NotFound,
            other => internal(other),
        }
    }

    #[derive(FromRow)]
    struct UserRow {
        id: Uuid,
        full_name: String,
        email: String,
        profile_picture: String,
        cover_picture: String,
        bio: Json<Bio>,
        gender: String,
        date_of_birth: Option<NaiveDate>,
        show_dob: String,
        created_at: DateTime<Utc>,
    }

    impl From<UserRow> for User {
        fn from(r: UserRow) -> Self {
            User {
                id: r.id,
                full_name: r.full_name,
                email: r.email,
                profile_picture: r.profile_picture,
                cover_picture: r.cover_picture,
                bio: r.bio.0,
                gender: r.gender.parse().unwrap_or_default(),
                date_of_birth: r.date_of_birth,
                privacy_settings: PrivacySettings { show_dob: r.show_dob.parse().unwrap_or_default() },
                created_at: r.created_at,
            }
        }
    }

    #[derive(FromRow)]
    struct CredentialRow {
        #[sqlx(flatten)]
        user: UserRow,
        password_hash: String,
    }

    #[derive(FromRow)]
    struct AuthorRow {
        id: Uuid,
        full_name: String,
        profile_picture: String,
    }

    #[derive(FromRow)]
    struct PostRow {
        id: Uuid,
        author_id: Uuid,
        content: String,
        media: Json<Vec<MediaItem>>,
        created_at: DateTime<Utc>,
    }

    #[derive(FromRow)]
    struct LikeRow {
        post_id: Uuid,
        user_id: Uuid,
    }

    #[derive(FromRow)]
    struct CommentRow {
        id: Uuid,
        post_id: Uuid,
        author_id: Uuid,
        content: String,
        created_at: DateTime<Utc>,
    }

    #[derive(FromRow)]
    struct ReplyRow {
        comment_id: Uuid,
        author_id: Uuid,
        content: String,
        created_at: DateTime<Utc>,
    }

    impl From<ReplyRow> for Reply {
        fn from(r: ReplyRow) -> Self {
            Reply { author: r.author_id, content: r.content, created_at: r.created_at }
        }
    }

    #[derive(FromRow)]
    struct ToggleRow {
        liked: bool,
        likes: i64,
    }

    /// Posts live in `posts`; their likes, comments and replies in child
    /// tables keyed by insertion sequence. Child mutations are single
    /// INSERT/DELETE statements so concurrent writers never overwrite each
    /// other.
    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
            sqlx::migrate!("./migrations").run(&self.pool).await
        }

        /// Attaches likes, comments and replies to the given rows, keeping
        /// the row order.
        async fn hydrate(&self, rows: Vec<PostRow>) -> RepoResult<Vec<Post>> {
            if rows.is_empty() {
                return Ok(Vec::new());
            }
            let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

            let likes = sqlx::query_as::<_, LikeRow>(
                "SELECT post_id, user_id FROM post_likes WHERE post_id = ANY($1) ORDER BY seq",
            )
            .bind(&ids)
            .fetch_all(&self.pool).await.map_err(internal)?;

            let comments = sqlx::query_as::<_, CommentRow>(
                "SELECT id, post_id, author_id, content, created_at FROM comments WHERE post_id = ANY($1) ORDER BY seq",
            )
            .bind(&ids)
            .fetch_all(&self.pool).await.map_err(internal)?;

            let replies = sqlx::query_as::<_, ReplyRow>(r#"
                SELECT r.comment_id, r.author_id, r.content, r.created_at
                FROM replies r
                JOIN comments c ON c.id = r.comment_id
                WHERE c.post_id = ANY($1)
                ORDER BY r.seq
            "#)
            .bind(&ids)
            .fetch_all(&self.pool).await.map_err(internal)?;

            let mut replies_by_comment: HashMap<Uuid, Vec<Reply>> = HashMap::new();
            for r in replies {
                replies_by_comment.entry(r.comment_id).or_default().push(r.into());
            }
            let mut comments_by_post: HashMap<Uuid, Vec<Comment>> = HashMap::new();
            for c in comments {
                comments_by_post.entry(c.post_id).or_default().push(Comment {
                    id: c.id,
                    author: c.author_id,
                    content: c.content,
                    replies: replies_by_comment.remove(&c.id).unwrap_or_default(),
                    created_at: c.created_at,
                });
            }
            let mut likes_by_post: HashMap<Uuid, Vec<Id>> = HashMap::new();
            for l in likes {
                likes_by_post.entry(l.post_id).or_default().push(l.user_id);
            }

            Ok(rows
                .into_iter()
                .map(|r| Post {
                    id: r.id,
                    author: r.author_id,
                    content: r.content,
                    media: r.media.0,
                    likes: likes_by_post.remove(&r.id).unwrap_or_default(),
                    comments: comments_by_post.remove(&r.id).unwrap_or_default(),
                    created_at: r.created_at,
                })
                .collect())
        }

        async fn hydrate_one(&self, row: PostRow) -> RepoResult<Post> {
            self.hydrate(vec![row]).await?.pop().ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let row = sqlx::query_as::<_, UserRow>(&format!(
                "INSERT INTO users (id, full_name, email, password_hash) VALUES ($1,$2,$3,$4) RETURNING {USER_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(&new.full_name)
            .bind(&new.email)
            .bind(&new.password_hash)
            .fetch_one(&self.pool).await
            .map_err(|e| match e {
                sqlx::Error::Database(ref d) if d.is_unique_violation() => RepoError::Conflict,
                other => internal(other),
            })?;
            Ok(row.into())
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool).await.map_err(internal)?;
            row.map(User::from).ok_or(RepoError::NotFound)
        }

        async fn find_credentials(&self, email: &str) -> RepoResult<(User, String)> {
            let row = sqlx::query_as::<_, CredentialRow>(&format!(
                "SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1"
            ))
            .bind(email)
            .fetch_optional(&self.pool).await.map_err(internal)?;
            row.map(|r| (r.user.into(), r.password_hash)).ok_or(RepoError::NotFound)
        }

        async fn update_user(&self, id: Id, upd: UpdateUser) -> RepoResult<User> {
            let row = sqlx::query_as::<_, UserRow>(&format!(r#"
                UPDATE users SET
                    full_name       = COALESCE($2, full_name),
                    bio             = COALESCE($3, bio),
                    gender          = COALESCE($4, gender),
                    date_of_birth   = COALESCE($5, date_of_birth),
                    profile_picture = COALESCE($6, profile_picture),
                    cover_picture   = COALESCE($7, cover_picture),
                    show_dob        = COALESCE($8, show_dob)
                WHERE id = $1
                RETURNING {USER_COLUMNS}
            "#))
            .bind(id)
            .bind(upd.full_name)
            .bind(upd.bio.map(Json))
            .bind(upd.gender.map(|g| g.as_str()))
            .bind(upd.date_of_birth)
            .bind(upd.profile_picture)
            .bind(upd.cover_picture)
            .bind(upd.privacy_settings.map(|p| p.show_dob.as_str()))
            .fetch_optional(&self.pool).await.map_err(internal)?;
            row.map(User::from).ok_or(RepoError::NotFound)
        }

        async fn set_picture(&self, id: Id, slot: PictureSlot, url: String) -> RepoResult<User> {
            let column = match slot {
                PictureSlot::Profile => "profile_picture",
                PictureSlot::Cover => "cover_picture",
            };
            let row = sqlx::query_as::<_, UserRow>(&format!(
                "UPDATE users SET {column} = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
            ))
            .bind(id)
            .bind(url)
            .fetch_optional(&self.pool).await.map_err(internal)?;
            row.map(User::from).ok_or(RepoError::NotFound)
        }

        async fn author_summaries(&self, ids: &[Id]) -> RepoResult<Authors> {
            if ids.is_empty() {
                return Ok(Authors::new());
            }
            let rows = sqlx::query_as::<_, AuthorRow>(
                "SELECT id, full_name, profile_picture FROM users WHERE id = ANY($1)",
            )
            .bind(ids)
            .fetch_all(&self.pool).await.map_err(internal)?;
            Ok(rows
                .into_iter()
                .map(|r| (r.id, AuthorSummary { id: r.id, full_name: r.full_name, profile_picture: r.profile_picture }))
                .collect())
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn list_posts(&self, offset: i64, limit: i64) -> RepoResult<Vec<Post>> {
            let rows = sqlx::query_as::<_, PostRow>(&format!(
                "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool).await.map_err(internal)?;
            self.hydrate(rows).await
        }

        async fn count_posts(&self) -> RepoResult<i64> {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts")
                .fetch_one(&self.pool).await.map_err(internal)
        }

        async fn list_posts_by_author(&self, author: Id) -> RepoResult<Vec<Post>> {
            let rows = sqlx::query_as::<_, PostRow>(&format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE author_id = $1 ORDER BY created_at DESC, id DESC"
            ))
            .bind(author)
            .fetch_all(&self.pool).await.map_err(internal)?;
            self.hydrate(rows).await
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let row = sqlx::query_as::<_, PostRow>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool).await.map_err(internal)?
                .ok_or(RepoError::NotFound)?;
            self.hydrate_one(row).await
        }

        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let row = sqlx::query_as::<_, PostRow>(&format!(
                "INSERT INTO posts (id, author_id, content, media) VALUES ($1,$2,$3,$4) RETURNING {POST_COLUMNS}"
            ))
            .bind(Uuid::new_v4())
            .bind(new.author)
            .bind(&new.content)
            .bind(Json(&new.media))
            .fetch_one(&self.pool).await.map_err(not_found_or_internal)?;
            Ok(Post {
                id: row.id,
                author: row.author_id,
                content: row.content,
                media: row.media.0,
                likes: Vec::new(),
                comments: Vec::new(),
                created_at: row.created_at,
            })
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let row = sqlx::query_as::<_, PostRow>(&format!(
                "UPDATE posts SET content = COALESCE($2, content), media = COALESCE($3, media) WHERE id = $1 RETURNING {POST_COLUMNS}"
            ))
            .bind(id)
            .bind(upd.content)
            .bind(upd.media.map(Json))
            .fetch_optional(&self.pool).await.map_err(internal)?
            .ok_or(RepoError::NotFound)?;
            self.hydrate_one(row).await
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM posts WHERE id = $1")
                .bind(id)
                .execute(&self.pool).await.map_err(internal)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn toggle_like(&self, post_id: Id, user_id: Id) -> RepoResult<LikeToggle> {
            let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
                .bind(post_id)
                .fetch_one(&self.pool).await.map_err(internal)?;
            if !exists {
                return Err(RepoError::NotFound);
            }
            // One statement: remove the like if present, otherwise add it.
            let row = sqlx::query_as::<_, ToggleRow>(r#"
                WITH removed AS (
                    DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2 RETURNING 1
                ), inserted AS (
                    INSERT INTO post_likes (post_id, user_id)
                    SELECT $1, $2 WHERE NOT EXISTS (SELECT 1 FROM removed)
                    ON CONFLICT DO NOTHING
                    RETURNING 1
                )
                SELECT
                    EXISTS (SELECT 1 FROM inserted) AS liked,
                    (SELECT COUNT(*) FROM post_likes WHERE post_id = $1)
                        + (SELECT COUNT(*) FROM inserted)
                        - (SELECT COUNT(*) FROM removed) AS likes
            "#)
            .bind(post_id)
            .bind(user_id)
            .fetch_one(&self.pool).await.map_err(not_found_or_internal)?;
            Ok(LikeToggle { liked: row.liked, count: row.likes })
        }

        async fn append_comment(&self, post_id: Id, new: NewComment) -> RepoResult<Comment> {
            let row = sqlx::query_as::<_, CommentRow>(r#"
                INSERT INTO comments (id, post_id, author_id, content)
                SELECT $1, $2, $3, $4 WHERE EXISTS (SELECT 1 FROM posts WHERE id = $2)
                RETURNING id, post_id, author_id, content, created_at
            "#)
            .bind(Uuid::new_v4())
            .bind(post_id)
            .bind(new.author)
            .bind(&new.content)
            .fetch_optional(&self.pool).await.map_err(not_found_or_internal)?
            .ok_or(RepoError::NotFound)?;
            Ok(Comment {
                id: row.id,
                author: row.author_id,
                content: row.content,
                replies: Vec::new(),
                created_at: row.created_at,
            })
        }

        async fn append_reply(&self, post_id: Id, comment_id: Id, new: NewReply) -> RepoResult<Reply> {
            let row = sqlx::query_as::<_, ReplyRow>(r#"
                INSERT INTO replies (comment_id, author_id, content)
                SELECT c.id, $3, $4 FROM comments c WHERE c.id = $2 AND c.post_id = $1
                RETURNING comment_id, author_id, content, created_at
            "#)
            .bind(post_id)
            .bind(comment_id)
            .bind(new.author)
            .bind(&new.content)
            .fetch_optional(&self.pool).await.map_err(not_found_or_internal)?
            .ok_or(RepoError::NotFound)?;
            Ok(row.into())
        }
    }
}
