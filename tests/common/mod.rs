#![allow(dead_code, unused_macros)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use actix_web::test::TestRequest;
use huddle::auth::{TokenIssuer, AUTH_COOKIE};
use huddle::media::{MediaFolder, MediaPath};
use huddle::repo::inmem::InMemRepo;
use huddle::storage::{MediaStore, MediaStoreError};
use huddle::AppState;

pub const SECRET: &[u8] = b"test-secret-must-be-32-bytes-long!!";

/// Builds the service under test around an `AppState`.
macro_rules! app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(huddle::SecurityHeaders::default())
                .app_data(actix_web::web::Data::new($state))
                .configure(huddle::config),
        )
        .await
    };
}

/// Signs a user up with password `secret1`; yields `(cookie, user id)`.
macro_rules! sign_up {
    ($app:expr, $name:expr, $email:expr) => {{
        let resp = actix_web::test::call_service(&$app, common::signup_req($name, $email, "secret1").to_request()).await;
        assert_eq!(resp.status(), 201, "signup of {} failed", $email);
        let cookie = common::auth_cookie(&resp).expect("auth cookie");
        let body: serde_json::Value = actix_web::test::read_body_json(resp).await;
        let id: uuid::Uuid = body["user"]["id"].as_str().unwrap().parse().unwrap();
        (cookie, id)
    }};
}

// ---------------- In-memory mock MediaStore (tests only) ----------------
#[derive(Default)]
pub struct MockMediaStore {
    files: Mutex<HashMap<(MediaFolder, String), Vec<u8>>>,
}

impl MockMediaStore {
    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        let path = MediaPath::parse(url).ok()?;
        self.files.lock().unwrap().get(&(path.folder, path.file_name)).cloned()
    }

    pub fn put(&self, folder: MediaFolder, name: &str, bytes: &[u8]) {
        self.files.lock().unwrap().insert((folder, name.to_string()), bytes.to_vec());
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl MediaStore for MockMediaStore {
    async fn save(&self, folder: MediaFolder, file_name: &str, bytes: &[u8]) -> Result<String, MediaStoreError> {
        self.put(folder, file_name, bytes);
        Ok(MediaPath { folder, file_name: file_name.to_string() }.url())
    }

    async fn load(&self, folder: MediaFolder, file_name: &str) -> Result<Vec<u8>, MediaStoreError> {
        let map = self.files.lock().unwrap();
        map.get(&(folder, file_name.to_string())).cloned().ok_or(MediaStoreError::NotFound)
    }

    async fn delete(&self, folder: MediaFolder, file_name: &str) -> Result<(), MediaStoreError> {
        self.files.lock().unwrap().remove(&(folder, file_name.to_string()));
        Ok(())
    }
}

pub struct Fixture {
    pub state: AppState,
    pub repo: InMemRepo,
    pub media: Arc<MockMediaStore>,
}

pub fn fixture() -> Fixture {
    let repo = InMemRepo::new();
    let media = Arc::new(MockMediaStore::default());
    let state = AppState {
        repo: Arc::new(repo.clone()),
        media: media.clone(),
        tokens: Arc::new(TokenIssuer::new(SECRET, false)),
    };
    Fixture { state, repo, media }
}

pub fn signup_req(name: &str, email: &str, password: &str) -> TestRequest {
    TestRequest::post()
        .uri("/api/auth/signup")
        .set_json(serde_json::json!({"fullName": name, "email": email, "password": password}))
}

pub fn login_req(email: &str, password: &str) -> TestRequest {
    TestRequest::post()
        .uri("/api/auth/login")
        .set_json(serde_json::json!({"email": email, "password": password}))
}

pub fn auth_cookie<B>(resp: &ServiceResponse<B>) -> Option<Cookie<'static>> {
    resp.response().cookies().find(|c| c.name() == AUTH_COOKIE).map(|c| c.into_owned())
}

// ---------------- multipart bodies ----------------
pub enum Part<'a> {
    File { name: &'a str, file_name: &'a str, mime: &'a str, bytes: &'a [u8] },
    Text { name: &'a str, value: &'a str },
}

/// Returns `(content type, body)`.
pub fn multipart(parts: &[Part<'_>]) -> (String, Vec<u8>) {
    let boundary = "----huddleTestBoundary";
    let mut body: Vec<u8> = Vec::new();
    for part in parts {
        match part {
            Part::File { name, file_name, mime, bytes } => {
                body.extend_from_slice(
                    format!(
                        "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {mime}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}").as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

pub fn png(w: u32, h: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(w, h, image::Rgba([200, 30, 30, 255]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

pub fn jpeg(w: u32, h: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(w, h, image::Rgb([10, 120, 200]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Jpeg)
        .unwrap();
    out
}
