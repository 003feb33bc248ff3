//! Deadline penalty worker.
//!
//! Reads configuration from the environment, then sweeps all groups every
//! `WORKER_INTERVAL_SECONDS`. With `WORKER_ONCE=1` it sweeps once and exits.

use log::{error, info};
use pibble_core::{
    flush_logging, init_logging_with_echo, open_db_with_lock_timeout, LogEcho, PenaltyPoller,
    WorkerConfig,
};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

fn main() -> ExitCode {
    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("pibble-worker: invalid configuration: {err}");
            return ExitCode::from(2);
        }
    };

    let log_dir = config.log_dir.to_string_lossy();
    if let Err(err) = init_logging_with_echo(&config.log_level, &log_dir, LogEcho::Stderr) {
        eprintln!("pibble-worker: logging disabled: {err}");
    }

    info!(
        "event=worker_start module=worker status=ok db_path={} interval_s={} once={} version={}",
        config.database_path.display(),
        config.interval.as_secs(),
        config.once,
        pibble_core::core_version()
    );

    let conn = match open_db_with_lock_timeout(&config.database_path, config.lock_timeout) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=worker_start module=worker status=error error_code=db_open_failed error={}",
                err
            );
            eprintln!("pibble-worker: cannot open database: {err}");
            return ExitCode::FAILURE;
        }
    };

    let stop = AtomicBool::new(config.once);
    let failures = PenaltyPoller::new(conn, config.interval).run_until(&stop);

    flush_logging();
    if config.once && failures > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
