use meridian_runner::{CONFIG_ENV, RunnerConfig, config_path};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match config_path(std::env::args().skip(1), std::env::var(CONFIG_ENV).ok()) {
        Some(path) => match RunnerConfig::load(&path) {
            Ok(config) => {
                log::info!("[RUNNER] Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::error!("[RUNNER] Cannot load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            log::info!("[RUNNER] No config given, using defaults");
            RunnerConfig::default()
        }
    };

    if let Err(e) = meridian_runner::run(config).await {
        log::error!("[RUNNER] {}", e);
        std::process::exit(1);
    }
}
