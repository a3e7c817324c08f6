use crate::config::*;
use crate::models::MIGRATIONS;
use crate::routes::*;
use axum::http::{Method, StatusCode, Uri};
use axum::routing::{get, post};
use axum::{http, Extension, Router};
use clap::Parser;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use log::{error, info};
use tower_http::cors::{Any, CorsLayer};

mod config;
mod error;
mod models;
mod routes;
mod utils;

#[derive(Clone)]
pub struct State {
    db_pool: Pool<ConnectionManager<PgConnection>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::try_init()?;
    let config: Config = Config::parse();

    // DB management
    let manager = ConnectionManager::<PgConnection>::new(&config.pg_url);
    let db_pool = Pool::builder()
        .max_size(config.max_connections)
        .test_on_check_out(true)
        .build(manager)?;

    // run migrations
    let mut connection = db_pool.get()?;
    connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("migrations could not run: {e}"))?;

    if config.seed {
        let user = models::seed(&mut connection)?;
        info!("Seeded test user {}", user.id);
    }

    let counts = models::get_counts(&mut connection)?;
    info!(
        "Database has {} users, {} campaigns and {} donations",
        counts.users, counts.campaigns, counts.donations
    );
    drop(connection);

    let state = State { db_pool };

    let addr: std::net::SocketAddr = format!("{}:{}", config.bind, config.port).parse()?;

    info!("Webserver running on http://{addr}");

    let server_router = Router::new()
        .route("/campaigns", get(list_campaigns).post(create_campaign))
        .route("/campaigns/:id", get(get_campaign))
        .route("/campaigns/:id/donations", get(get_campaign_donations))
        .route("/campaigns/:id/leaderboard", get(get_campaign_leaderboard))
        .route("/donations", post(create_donation))
        .route("/donations/:id", get(get_donation))
        .route("/users/:id", get(get_user).post(update_user))
        .route("/users/:id/wallets", post(sync_wallets))
        .route("/users/:id/delete", get(delete_user))
        .route("/count", get(count))
        .fallback(fallback)
        .layer(Extension(state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(vec![http::header::CONTENT_TYPE])
                .allow_methods([Method::GET, Method::POST]),
        );

    let server = axum::Server::bind(&addr).serve(server_router.into_make_service());

    let graceful = server.with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
        }
    });

    // Await the server to receive the shutdown signal
    if let Err(e) = graceful.await {
        error!("shutdown error: {}", e);
    }

    Ok(())
}

async fn fallback(uri: Uri) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("No route for {}", uri))
}
