//! Tracing setup shared by the planner binary, benches and tests
//!
//! Records go to stderr with a timestamp, level and target. The default
//! level is INFO; `RUST_LOG` overrides it, e.g.
//! `RUST_LOG=gpmp_solver::optimizer=debug cargo run --bin plan_planar_arm`.

use tracing::{Level, debug};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::SystemTime;

/// Install the subscriber at INFO.
///
/// ```no_run
/// gpmp_solver::init_logger();
/// tracing::info!("Planner started");
/// ```
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Install the subscriber with `default_level` for targets `RUST_LOG` does not name.
///
/// Calling this again, or after another subscriber was set, keeps the
/// existing one and reports it at DEBUG.
pub fn init_logger_with_level(default_level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(SystemTime)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_thread_names(false)
        .try_init();

    if let Err(e) = installed {
        debug!("Keeping the existing tracing subscriber: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_initialization_keeps_first_subscriber() {
        init_logger_with_level(Level::DEBUG);
        init_logger();
        init_logger_with_level(Level::TRACE);
        tracing::info!("logger still usable after repeated setup");
    }
}
