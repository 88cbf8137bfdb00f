use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use vigil_api::auth::{self, AppState, AppStateInner};
use vigil_api::middleware::require_auth;
use vigil_api::{comments, export, moderation, news, profile, users};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("VIGIL_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("VIGIL_DB_PATH").unwrap_or_else(|_| "vigil.db".into());
    let host = std::env::var("VIGIL_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("VIGIL_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = vigil_db::Database::open(&PathBuf::from(&db_path))?;

    let state: AppState = Arc::new(AppStateInner { db, jwt_secret });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/news", get(news::list_news))
        .route("/news/{news_id}", get(news::get_news))
        .route("/news/{news_id}/export", get(export::export_article))
        .route("/news/{news_id}/comments", get(comments::list_comments))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/me", get(profile::me))
        .route("/me/news", get(news::list_my_news))
        .route("/me/username", post(profile::claim_username))
        .route("/me/username", put(profile::change_username))
        .route("/me/password", put(profile::change_password))
        .route("/news", post(news::create_news))
        .route("/news/{news_id}", put(news::update_news))
        .route("/news/{news_id}", delete(news::delete_news))
        .route("/news/{news_id}/like", post(news::like_news))
        .route("/news/{news_id}/comments", post(comments::post_comment))
        .route("/comments/{comment_id}", delete(comments::delete_comment))
        .route("/comments/{comment_id}/like", post(comments::like_comment))
        .route("/news/{news_id}/reports", post(moderation::report_news))
        .route(
            "/comments/{comment_id}/reports",
            post(moderation::report_comment),
        )
        .route("/moderation/reports", get(moderation::list_reports))
        .route(
            "/moderation/news/{news_id}",
            delete(moderation::remove_news),
        )
        .route(
            "/moderation/comments/{comment_id}",
            delete(moderation::remove_comment),
        )
        .route(
            "/moderation/reports/news/{report_id}",
            delete(moderation::dismiss_news_report),
        )
        .route(
            "/moderation/reports/comments/{report_id}",
            delete(moderation::dismiss_comment_report),
        )
        .route("/moderation/users/{user_id}/ban", post(moderation::ban_user))
        .route(
            "/moderation/users/{user_id}/ban",
            delete(moderation::unban_user),
        )
        .route("/admin/users", get(users::list_users))
        .route("/admin/users/{user_id}/role", put(users::set_role))
        .route("/admin/users/{user_id}", delete(users::delete_user))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Vigil server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
