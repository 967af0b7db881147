use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;

use novelism::auth::AuthMiddleware;
use novelism::config::Config;
use novelism::mailer::{LogMailer, Mailer, SmtpMailer};
use novelism::routes::{self, health};
use novelism::state::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(config.db_timeout)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            log::error!("failed to connect to the database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        log::error!("failed to run database migrations: {}", e);
        std::process::exit(1);
    }

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => match SmtpMailer::new(smtp, &config.mail_from) {
            Ok(mailer) => Arc::new(mailer),
            Err(e) => {
                log::error!("invalid mail configuration: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            log::warn!("SMTP_HOST is not set, outgoing mail will only be logged");
            Arc::new(LogMailer::new(config.mail_from.clone()))
        }
    };
    let state = web::Data::new(AppState::from_config(&pool, &config, mailer));

    log::info!("starting Novelism server at {}", config.server_url());

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .service(health::health)
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware::new(state.tokens.clone()))
                    .configure(routes::config),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await
}
