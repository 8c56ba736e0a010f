use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use eco_leveling::auth::SessionSigner;
use eco_leveling::config::AppConfig;
use eco_leveling::media::build_media_store;
use eco_leveling::openapi::ApiDoc;
use eco_leveling::rate_limit::{InMemoryRateLimiter, RateLimiterFacade};
use eco_leveling::repo::Repo;
use eco_leveling::{config, AppState, SecurityHeaders};

#[cfg(not(any(feature = "inmem-store", feature = "postgres-store")))]
compile_error!("enable at least one of the `inmem-store` / `postgres-store` features");

#[cfg(feature = "postgres-store")]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    use sqlx::postgres::PgPoolOptions;
    let url = cfg
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set for postgres-store"))?;
    let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Using Postgres repository backend (migrations applied)");
    Ok(Arc::new(eco_leveling::repo::pg::PgRepo::new(pool)))
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_repo(_cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    info!("Using in-memory repository backend");
    Ok(Arc::new(eco_leveling::repo::inmem::InMemRepo::new()))
}

fn fatal(msg: impl std::fmt::Display) -> ! {
    eprintln!("{msg}");
    std::process::exit(1);
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // .env is a development convenience only; production sets real variables
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    let cfg = AppConfig::from_env().unwrap_or_else(|e| fatal(format!("configuration error: {e}")));

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();
    info!("Bootstrapping Eco-Leveling server");
    info!("Frontend URL: {}", cfg.frontend_url);

    let repo = build_repo(&cfg).await.unwrap_or_else(|e| {
        error!("storage initialisation failed: {e:#}");
        fatal(format!("storage initialisation failed: {e:#}"))
    });
    let media = build_media_store(&cfg.media).await.unwrap_or_else(|e| {
        error!("media store initialisation failed: {e:#}");
        fatal(format!("media store initialisation failed: {e:#}"))
    });

    let session = SessionSigner::new(&cfg.jwt_secret, cfg.session_ttl).with_secure_cookie(cfg.cookie_secure);
    let mut state = AppState::new(repo, media, session).with_bootstrap_moderators(cfg.bootstrap_moderators.clone());
    match cfg.rate_limit.clone() {
        Some(rl) => state = state.with_rate_limiter(RateLimiterFacade::new(InMemoryRateLimiter::new(), rl)),
        None => warn!("Rate limiting disabled"),
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => warn!("Prometheus recorder not installed: {e}"),
    }

    let openapi = ApiDoc::openapi();
    let data = web::Data::new(state);
    let frontend_url = cfg.frontend_url.clone();
    let enable_hsts = cfg.enable_hsts;

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            // local Vite dev server
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://127.0.0.1:5173")
            .allowed_origin(&frontend_url)
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::new().with_hsts(enable_hsts))
            .wrap(cors)
            .app_data(data.clone())
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(&cfg.bind_addr)?;

    info!("Listening on http://{}", cfg.bind_addr);
    server.run().await
}
