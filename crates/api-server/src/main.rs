use api_server::AppConfig;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("Starting Coinfolio API server");
    let config = AppConfig::from_env()?;
    tracing::info!("  Database: {}", config.database_url);
    tracing::info!(
        "  Alert monitor: {} (every {}s, threshold {}%, suppression {} min)",
        if config.monitor.enabled { "on" } else { "off" },
        config.monitor.interval_secs,
        config.monitor.threshold_percent,
        config.monitor.suppression_minutes
    );

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(api_server::run_server(config))
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
