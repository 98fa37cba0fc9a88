use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use huddle::auth::TokenIssuer;
use huddle::openapi::ApiDoc;
use huddle::repo::{inmem::InMemRepo, pg::PgRepo, Repo};
use huddle::storage::FsMediaStore;
use huddle::{config, AppConfig, AppState, SecurityHeaders};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    let cfg = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {e}");
            eprintln!("Please copy .env.example to .env and configure it");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping huddle server");
    info!("Base URL: {}", cfg.base_url);

    let repo = build_repo(&cfg).await?;
    let state = AppState {
        repo,
        media: Arc::new(FsMediaStore::new(cfg.upload_dir.clone())),
        tokens: Arc::new(TokenIssuer::new(cfg.jwt_secret.as_bytes(), cfg.production)),
    };

    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let bind_addr = cfg.bind_addr.clone();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            // during local dev allow common frontend ports
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://127.0.0.1:3000")
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://127.0.0.1:5173")
            .allowed_origin(&cfg.base_url)
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_config(&cfg))
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(&bind_addr)?;

    info!("Listening on http://{bind_addr}");
    server.run().await
}

/// Postgres when `DATABASE_URL` is set, otherwise the in-memory store
/// (snapshotted under `DATA_DIR` when given).
async fn build_repo(cfg: &AppConfig) -> std::io::Result<Arc<dyn Repo>> {
    let Some(db_url) = cfg.database_url.as_deref() else {
        let repo = match &cfg.data_dir {
            Some(dir) => {
                info!("Using in-memory repository backend with snapshots in '{}'", dir.display());
                InMemRepo::with_snapshot(dir)
            }
            None => {
                info!("Using in-memory repository backend");
                InMemRepo::new()
            }
        };
        return Ok(Arc::new(repo));
    };

    use sqlx::postgres::PgPoolOptions;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_lazy(db_url)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("invalid DATABASE_URL: {e}")))?;
    let repo = PgRepo::new(pool);
    repo.migrate()
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("migrations failed: {e}")))?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(repo))
}
