use acarshub::config::Settings;
use acarshub::instance_lock::InstanceLock;
use acarshub::log_format::TargetFirstFormat;
use tracing_subscriber::EnvFilter;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let settings = Settings::load();

    tracing_subscriber::fmt()
        .event_format(TargetFirstFormat)
        .with_env_filter(EnvFilter::new(settings.tracing_filter()))
        .init();

    let _lock = match InstanceLock::new("acarshub") {
        Ok(lock) => lock,
        Err(err) => {
            tracing::error!(error = %err, "another instance is already running, exiting");
            std::process::exit(1);
        }
    };

    if let Err(err) = acarshub::startup::run(settings).await {
        tracing::error!(error = %err, "fatal error, shutting down");
        std::process::exit(1);
    }
}
