use std::env;
use std::error::Error;
use std::thread;

use relay_http::config::{Builder, CONFIG_FILE};
use relay_http::{abort, OriginHandler, ProxyHandler, Router, Server, StaticResources, StatusCode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn routes() -> Router {
    let mut router = Router::new();
    router
        .route("/", |_| Ok("<h1>relay-http</h1>".to_string()))
        .route("/forbidden", |_| abort(StatusCode::Forbidden));
    router
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = env::args().collect();

    let cli_cfg = Builder::from_cli_args(&args)?;
    let file_cfg = Builder::from_config_file(CONFIG_FILE)?;
    let env_cfg = Builder::from_env()?;

    let cfg = cli_cfg.merge(&file_cfg).merge(&env_cfg).build();
    tracing::info!(?cfg, "config loaded");

    let resources = StaticResources::scan(&cfg.resource_dir).unwrap_or_else(|e| {
        tracing::warn!(
            dir = %cfg.resource_dir.display(),
            error = %e,
            "no static resources will be served"
        );
        StaticResources::empty(&cfg.resource_dir)
    });
    tracing::info!(count = resources.len(), "static resources found");

    let origin = Server::new(
        &cfg.server_addr,
        cfg.pool_size,
        OriginHandler::new(routes(), resources),
    );
    let proxy = Server::new(&cfg.proxy_addr, cfg.pool_size, ProxyHandler::new());

    let origin_thread = thread::spawn(move || origin.run().map_err(|e| e.to_string()));
    let proxy_thread = thread::spawn(move || proxy.run().map_err(|e| e.to_string()));

    for (name, handle) in [("origin", origin_thread), ("proxy", proxy_thread)] {
        match handle.join() {
            Ok(Ok(())) => tracing::info!(server = name, "stopped"),
            Ok(Err(e)) => return Err(format!("{name} server: {e}").into()),
            Err(_) => return Err(format!("{name} server thread panicked").into()),
        }
    }

    tracing::info!("Shutting down.");

    Ok(())
}
