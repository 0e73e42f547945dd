use actix_web::{web, App, HttpServer};
use clap::Parser;
use indicadores_api::{clock::SystemClock, cors, routes, AppState, Args, Upstreams};
use std::sync::Arc;
use tracing::{error, info};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_logging();

    let args = Args::parse();
    let address = format!("{}:{}", args.ip, args.port);

    let upstreams = Upstreams::from_config(&args).map_err(|e| {
        error!(error = %e, "failed to build upstream clients");
        std::io::Error::other("upstream client initialization failed")
    })?;

    info!(
        %address,
        cache_lifetime_hours = args.cache_lifetime,
        indicators_url = %args.indicators_url,
        conversion_url = %args.conversion_url,
        verify_tls = args.verify_tls,
        "server running"
    );

    let app_state = web::Data::new(AppState::new(&args, upstreams, Arc::new(SystemClock)));

    HttpServer::new(move || {
        App::new()
            .wrap(cors())
            .app_data(app_state.clone())
            .configure(routes)
    })
    .bind(&address)?
    .run()
    .await
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
