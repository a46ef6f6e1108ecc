//! Process entry point: loads configuration, installs tracing, and runs the
//! scheduler until a shutdown signal is observed.

use wallbot::config::AppConfig;
use wallbot::telemetry;

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = wallbot::scheduler::run(config).await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}
