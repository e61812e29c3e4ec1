#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use chrono::TimeDelta;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use streamhub_api::{AppState, AppStateInner, TokenService, router};
use streamhub_db::Database;
use streamhub_media::{MediaUploader, UploadedMedia};

pub const ACCESS_SECRET: &str = "test-access-secret";
pub const REFRESH_SECRET: &str = "test-refresh-secret";
const BOUNDARY: &str = "streamhub-test-boundary";

/// Media host stand-in: hands out predictable URLs and can be told to fail,
/// either always or on one numbered attempt.
#[derive(Default)]
pub struct FakeUploader {
    uploads: AtomicUsize,
    attempts: AtomicUsize,
    fail: AtomicBool,
    /// 1-based attempt to reject; 0 disables.
    fail_on: AtomicUsize,
}

impl FakeUploader {
    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Reject only the `n`th upload attempt, counting from the first call.
    pub fn fail_attempt(&self, n: usize) {
        self.fail_on.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaUploader for FakeUploader {
    async fn upload(&self, path: &Path) -> anyhow::Result<UploadedMedia> {
        assert!(path.exists(), "staged file must exist while uploading");
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) || self.fail_on.load(Ordering::SeqCst) == attempt {
            anyhow::bail!("media host unavailable");
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(UploadedMedia {
            url: format!("https://media.test/{}.png", n),
            public_id: Some(format!("asset-{}", n)),
        })
    }
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub media: Arc<FakeUploader>,
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Response {
    /// Values of every `Set-Cookie` header.
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        let prefix = format!("{}=", name);
        self.set_cookies()
            .into_iter()
            .find(|c| c.starts_with(&prefix))
    }

    pub fn cookie_value(&self, name: &str) -> Option<String> {
        let raw = self.cookie(name)?;
        let first = raw.split(';').next()?;
        Some(first[name.len() + 1..].to_string())
    }
}

pub fn test_app() -> TestApp {
    let media = Arc::new(FakeUploader::default());
    let state: AppState = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        tokens: TokenService::new(
            ACCESS_SECRET,
            TimeDelta::minutes(15),
            REFRESH_SECRET,
            TimeDelta::days(10),
        ),
        media: media.clone(),
        upload_dir: std::env::temp_dir().join(format!("streamhub-test-{}", Uuid::new_v4())),
        email_domain: "gmail.com".to_string(),
    });

    TestApp {
        app: router(state.clone()),
        state,
        media,
    }
}

pub struct FilePart<'a> {
    pub field: &'a str,
    pub file_name: &'a str,
    pub data: &'a [u8],
}

pub fn avatar() -> FilePart<'static> {
    FilePart {
        field: "avatar",
        file_name: "me.png",
        data: b"\x89PNG fake avatar bytes",
    }
}

pub fn cover() -> FilePart<'static> {
    FilePart {
        field: "coverImage",
        file_name: "cover.jpg",
        data: b"fake cover bytes",
    }
}

pub fn multipart_body(fields: &[(&str, &str)], files: &[FilePart<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    for file in files {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                file.field, file.file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(file.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn multipart_request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder().method(method).uri(uri).header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={}", BOUNDARY),
    )
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Response {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Response {
            status,
            headers,
            body,
        }
    }

    pub async fn send_multipart(
        &self,
        method: &str,
        uri: &str,
        access_token: Option<&str>,
        fields: &[(&str, &str)],
        files: &[FilePart<'_>],
    ) -> Response {
        let mut builder = multipart_request(method, uri);
        if let Some(token) = access_token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = builder
            .body(Body::from(multipart_body(fields, files)))
            .unwrap();
        self.send(req).await
    }

    pub async fn send_json(
        &self,
        method: &str,
        uri: &str,
        access_token: Option<&str>,
        cookie: Option<&str>,
        body: Value,
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = access_token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let req = builder.body(Body::from(body.to_string())).unwrap();
        self.send(req).await
    }

    pub async fn get(&self, uri: &str, access_token: Option<&str>) -> Response {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = access_token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn register(&self, full_name: &str, username: &str, email: &str, password: &str) -> Response {
        self.send_multipart(
            "POST",
            "/api/v1/users/register",
            None,
            &[
                ("fullName", full_name),
                ("username", username),
                ("email", email),
                ("password", password),
            ],
            &[avatar()],
        )
        .await
    }

    pub async fn login(&self, username: &str, password: &str) -> Response {
        self.send_json(
            "POST",
            "/api/v1/users/login",
            None,
            None,
            serde_json::json!({ "username": username, "password": password }),
        )
        .await
    }

    /// Register and log in; returns the login response.
    pub async fn signed_in(&self, username: &str) -> Response {
        let email = format!("{}@gmail.com", username);
        let resp = self.register("Test User", username, &email, "password123").await;
        assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.body);
        let resp = self.login(username, "password123").await;
        assert_eq!(resp.status, StatusCode::OK, "{}", resp.body);
        resp
    }

    pub fn user_count(&self) -> usize {
        self.state
            .db
            .with_conn(|conn| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
                Ok(n as usize)
            })
            .unwrap()
    }
}

pub fn access_token(login: &Response) -> String {
    login.body["data"]["accessToken"].as_str().unwrap().to_string()
}

pub fn refresh_token(login: &Response) -> String {
    login.body["data"]["refreshToken"].as_str().unwrap().to_string()
}
