use std::collections::VecDeque;
use std::env;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use rcve_backend::analysis::{AnalysisError, DocumentClassifier, ImagePart};
use rcve_backend::auth::jwt::JwtService;
use rcve_backend::auth::password::hash_password;
use rcve_backend::config::AppConfig;
use rcve_backend::db::{self, PgPool};
use rcve_backend::models::{NewDocument, NewUser, NewVehicle};
use rcve_backend::routes;
use rcve_backend::state::AppState;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[allow(dead_code)]
#[derive(Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub image_count: usize,
}

/// Scripted stand-in for the hosted classifier: responses are popped in
/// order, calls are recorded for assertions.
#[derive(Default)]
pub struct FakeClassifier {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeClassifier {
    pub async fn push_response(&self, raw: impl Into<String>) {
        self.responses.lock().await.push_back(raw.into());
    }

    #[allow(dead_code)]
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl DocumentClassifier for FakeClassifier {
    async fn classify(&self, prompt: &str, images: &[ImagePart]) -> Result<String, AnalysisError> {
        self.calls.lock().await.push(RecordedCall {
            prompt: prompt.to_string(),
            image_count: images.len(),
        });
        self.responses
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| AnalysisError::Upstream("no scripted response".to_string()))
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    classifier: Arc<FakeClassifier>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            refresh_token_expiry_days: 30,
            refresh_cookie_secure: false,
            refresh_cookie_domain: None,
            cors_allowed_origin: None,
            gemini_api_key: "test-key".to_string(),
            gemini_model: "test-model".to_string(),
            gemini_endpoint: "http://127.0.0.1:1".to_string(),
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let classifier = Arc::new(FakeClassifier::default());
        let classifier_for_state: Arc<dyn DocumentClassifier> = classifier.clone();
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool.clone(), config, classifier_for_state, jwt);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            classifier,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    pub fn classifier(&self) -> Arc<FakeClassifier> {
        self.classifier.clone()
    }

    pub async fn insert_user(&self, username: &str, password: &str, role: &str) -> Result<Uuid> {
        let username = username.to_string();
        let password = password.to_string();
        let role = role.to_string();
        self.with_conn(move |conn| {
            let password_hash = hash_password(&password)?;
            let user = NewUser {
                id: Uuid::new_v4(),
                email: format!("{username}@example.com"),
                username,
                password_hash,
                role,
            };
            diesel::insert_into(rcve_backend::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    pub async fn insert_vehicle(
        &self,
        owner_id: Uuid,
        reg_number: &str,
        model: &str,
        vehicle_type: &str,
        token: Option<String>,
    ) -> Result<Uuid> {
        let reg_number = reg_number.to_string();
        let model = model.to_string();
        let vehicle_type = vehicle_type.to_string();
        self.with_conn(move |conn| {
            let vehicle = NewVehicle {
                id: Uuid::new_v4(),
                owner_id,
                reg_number,
                model,
                vehicle_type,
                token,
            };
            diesel::insert_into(rcve_backend::schema::vehicles::table)
                .values(&vehicle)
                .execute(conn)
                .context("failed to insert vehicle")?;
            Ok(vehicle.id)
        })
        .await
    }

    /// Direct insert used for forced-collision and fixture setup; surfaces
    /// constraint violations to the caller.
    pub async fn insert_document(
        &self,
        token: &str,
        doc_type: &str,
        status: &str,
        analysis_result: &str,
        user_id: Option<Uuid>,
        vehicle_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let token = token.to_string();
        let doc_type = doc_type.to_string();
        let status = status.to_string();
        let analysis_result = analysis_result.to_string();
        self.with_conn(move |conn| {
            let document = NewDocument {
                id: Uuid::new_v4(),
                doc_type,
                image_url: "[\"data:image/png;base64,aaaa\"]".to_string(),
                analysis_result,
                status,
                token,
                user_id,
                vehicle_id,
            };
            diesel::insert_into(rcve_backend::schema::documents::table)
                .values(&document)
                .execute(conn)
                .context("failed to insert document")?;
            Ok(document.id)
        })
        .await
    }

    pub async fn count_documents(&self) -> Result<i64> {
        self.with_conn(|conn| {
            use rcve_backend::schema::documents::dsl::documents;
            documents
                .count()
                .get_result(conn)
                .context("failed to count documents")
        })
        .await
    }

    pub async fn vehicle_token(&self, vehicle_id: Uuid) -> Result<Option<String>> {
        self.with_conn(move |conn| {
            use rcve_backend::schema::vehicles::dsl;
            dsl::vehicles
                .find(vehicle_id)
                .select(dsl::token)
                .first(conn)
                .context("failed to load vehicle token")
        })
        .await
    }

    pub async fn login_token(&self, username: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            username: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json(
                "/api/auth/login",
                &LoginPayload { username, password },
                None,
            )
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = body_to_vec(response.into_body()).await?;
        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = serde_json::from_slice(&body)?;
        Ok(parsed.access_token)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.request_json(Method::POST, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn delete_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.request_json(Method::DELETE, path, payload, token)
            .await
    }

    async fn request_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn body_to_json(body: Body) -> Result<serde_json::Value> {
    let bytes = body_to_vec(body).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE documents, vehicles, refresh_tokens, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
