use huddle::models::*;
use huddle::repo::{inmem::InMemRepo, RepoError};
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use huddle::repo::{PostRepo, UserRepo};

/// Helper that returns a fresh, empty repository for every test run.
fn repo() -> InMemRepo {
    InMemRepo::new()
}

fn new_user(email: &str) -> NewUser {
    NewUser { full_name: format!("User {email}"), email: email.into(), password_hash: "$argon2id$stub".into() }
}

fn text_post(author: Id, content: &str) -> NewPost {
    NewPost { author, content: content.into(), media: vec![] }
}

#[tokio::test]
async fn user_crud_and_conflict() {
    let r = repo();
    let u = r.create_user(new_user("a@x.com")).await.unwrap();
    assert_eq!(u.email, "a@x.com");
    assert!(u.profile_picture.is_empty());

    let err = r.create_user(new_user("a@x.com")).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict));

    let (found, hash) = r.find_credentials("a@x.com").await.unwrap();
    assert_eq!(found.id, u.id);
    assert_eq!(hash, "$argon2id$stub");
    assert!(matches!(r.find_credentials("b@x.com").await, Err(RepoError::NotFound)));

    let upd = UpdateUser { full_name: Some("Renamed".into()), gender: Some(Gender::Other), ..Default::default() };
    let updated = r.update_user(u.id, upd).await.unwrap();
    assert_eq!(updated.full_name, "Renamed");
    assert_eq!(updated.gender, Gender::Other);
    assert_eq!(updated.email, "a@x.com");

    let pic = r.set_picture(u.id, PictureSlot::Cover, "/cover-pictures/c.png".into()).await.unwrap();
    assert_eq!(pic.cover_picture, "/cover-pictures/c.png");
    assert!(pic.profile_picture.is_empty());

    assert!(matches!(r.get_user(uuid::Uuid::new_v4()).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn author_summaries_skip_unknown_ids() {
    let r = repo();
    let a = r.create_user(new_user("a@x.com")).await.unwrap();
    let ghost = uuid::Uuid::new_v4();
    let authors = r.author_summaries(&[a.id, ghost]).await.unwrap();
    assert_eq!(authors.len(), 1);
    assert_eq!(authors[&a.id].full_name, "User a@x.com");
}

#[tokio::test]
async fn listing_is_newest_first_with_offsets() {
    let r = repo();
    let a = r.create_user(new_user("a@x.com")).await.unwrap();
    let b = r.create_user(new_user("b@x.com")).await.unwrap();
    for (author, text) in [(a.id, "1"), (b.id, "2"), (a.id, "3"), (a.id, "4")] {
        r.create_post(text_post(author, text)).await.unwrap();
    }

    assert_eq!(r.count_posts().await.unwrap(), 4);
    let page: Vec<String> = r.list_posts(1, 2).await.unwrap().into_iter().map(|p| p.content).collect();
    assert_eq!(page, ["3", "2"]);
    assert!(r.list_posts(10, 2).await.unwrap().is_empty());

    let by_a: Vec<String> = r.list_posts_by_author(a.id).await.unwrap().into_iter().map(|p| p.content).collect();
    assert_eq!(by_a, ["4", "3", "1"]);
}

#[tokio::test]
async fn update_and_delete_post() {
    let r = repo();
    let a = r.create_user(new_user("a@x.com")).await.unwrap();
    let p = r.create_post(text_post(a.id, "draft")).await.unwrap();

    let media = vec![MediaItem { kind: MediaKind::Image, url: "/posts/x.png".into() }];
    let updated = r.update_post(p.id, UpdatePost { content: None, media: Some(media.clone()) }).await.unwrap();
    assert_eq!(updated.content, "draft");
    assert_eq!(updated.media, media);

    r.toggle_like(p.id, a.id).await.unwrap();
    r.append_comment(p.id, NewComment { author: a.id, content: "c".into() }).await.unwrap();
    r.delete_post(p.id).await.unwrap();
    assert!(matches!(r.get_post(p.id).await, Err(RepoError::NotFound)));
    assert!(matches!(r.delete_post(p.id).await, Err(RepoError::NotFound)));
    assert!(matches!(r.toggle_like(p.id, a.id).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn replies_attach_to_the_right_comment() {
    let r = repo();
    let a = r.create_user(new_user("a@x.com")).await.unwrap();
    let p = r.create_post(text_post(a.id, "hello")).await.unwrap();
    let c1 = r.append_comment(p.id, NewComment { author: a.id, content: "one".into() }).await.unwrap();
    let c2 = r.append_comment(p.id, NewComment { author: a.id, content: "two".into() }).await.unwrap();

    r.append_reply(p.id, c2.id, NewReply { author: a.id, content: "re: two".into() }).await.unwrap();
    let post = r.get_post(p.id).await.unwrap();
    let find = |id: Id| post.comments.iter().find(|c| c.id == id).unwrap();
    assert!(find(c1.id).replies.is_empty());
    assert_eq!(find(c2.id).replies[0].content, "re: two");

    let err = r.append_reply(p.id, uuid::Uuid::new_v4(), NewReply { author: a.id, content: "x".into() }).await;
    assert!(matches!(err, Err(RepoError::NotFound)));
    assert_eq!(r.get_post(p.id).await.unwrap(), post);

    // a comment id from another post does not match
    let other = r.create_post(text_post(a.id, "other")).await.unwrap();
    let err = r.append_reply(other.id, c1.id, NewReply { author: a.id, content: "x".into() }).await;
    assert!(matches!(err, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn concurrent_comments_and_likes_are_not_lost() {
    let r = repo();
    let a = r.create_user(new_user("a@x.com")).await.unwrap();
    let p = r.create_post(text_post(a.id, "busy")).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let r = r.clone();
        handles.push(tokio::spawn(async move {
            let user = uuid::Uuid::new_v4();
            r.append_comment(p.id, NewComment { author: user, content: format!("c{i}") }).await.unwrap();
            r.toggle_like(p.id, user).await.unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let post = r.get_post(p.id).await.unwrap();
    assert_eq!(post.comments.len(), 20);
    assert_eq!(post.likes.len(), 20);
}

#[tokio::test]
async fn snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let (user_id, post_id) = {
        let r = InMemRepo::with_snapshot(dir.path());
        let u = r.create_user(new_user("a@x.com")).await.unwrap();
        let p = r.create_post(text_post(u.id, "persisted")).await.unwrap();
        let c = r.append_comment(p.id, NewComment { author: u.id, content: "kept".into() }).await.unwrap();
        r.append_reply(p.id, c.id, NewReply { author: u.id, content: "also kept".into() }).await.unwrap();
        r.toggle_like(p.id, u.id).await.unwrap();
        (u.id, p.id)
    };
    assert!(dir.path().join("state.json").exists());
    assert!(!dir.path().join("state.json.tmp").exists());

    let r = InMemRepo::with_snapshot(dir.path());
    let (user, _) = r.find_credentials("a@x.com").await.unwrap();
    assert_eq!(user.id, user_id);
    let post = r.get_post(post_id).await.unwrap();
    assert_eq!(post.content, "persisted");
    assert_eq!(post.likes, vec![user_id]);
    assert_eq!(post.comments[0].replies[0].content, "also kept");
}

#[tokio::test]
async fn stale_temp_file_does_not_affect_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("state.json.tmp"), b"{ half written").unwrap();
    let r = InMemRepo::with_snapshot(dir.path());
    r.create_user(new_user("a@x.com")).await.unwrap();
    assert!(!dir.path().join("state.json.tmp").exists());

    let reloaded = InMemRepo::with_snapshot(dir.path());
    assert!(reloaded.find_credentials("a@x.com").await.is_ok());
}

#[tokio::test]
async fn corrupt_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("state.json"), b"{ not json").unwrap();
    let r = InMemRepo::with_snapshot(dir.path());
    assert_eq!(r.count_posts().await.unwrap(), 0);
}
