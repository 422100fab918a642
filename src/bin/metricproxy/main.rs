#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use metricproxy::{
    bootstrap::{ObfuscationRules, Proxy, remove_pid_file, write_pid_file},
    config::{self, Config},
    logger,
    registry::Registry,
};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Debug, Parser)]
#[command(name = "metricproxy", about = "Telemetry forwarding proxy")]
struct Args {
    /// Configuration file to load
    #[arg(long, env = "METRICPROXY_CONFIGFILE", default_value = "sf/metricproxy.conf")]
    configfile: PathBuf,

    /// File the process id is written to
    #[arg(long, env = "METRICPROXY_PIDFILE", default_value = "metricproxy.pid")]
    pidfile: PathBuf,
}

fn enable_logging_subsystem(config: &Config) -> Result<(), String> {
    let env_filter = format!(
        "h2=off,hyper=off,reqwest=off,rustls=off,{}",
        config.log_level.as_ref()
    );
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter)
                .map_err(|e| format!("could not parse log level in configuration: {e}"))?,
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(false)
        .without_time()
        .event_format(logger::Formatter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("setting default subscriber failed: {e}"))?;

    debug!("Logging subsystem enabled");
    Ok(())
}

/// Cancels `shutdown` on SIGINT or SIGTERM and reloads the obfuscation rules
/// on SIGHUP.
fn watch_signals(
    shutdown: CancellationToken,
    rules: ObfuscationRules,
    configfile: PathBuf,
) -> std::io::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = interrupt.recv() => {
                    info!("Received SIGINT, shutting down");
                    shutdown.cancel();
                    break;
                }
                _ = terminate.recv() => {
                    info!("Received SIGTERM, shutting down");
                    shutdown.cancel();
                    break;
                }
                _ = hangup.recv() => {
                    info!("Received SIGHUP, reloading obfuscation rules");
                    if let Err(e) = rules.reload_from_file(&configfile) {
                        error!("Reload failed, keeping active rules: {e}");
                    }
                }
            }
        }
    });
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match config::get_config(&args.configfile) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Unable to load config: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = enable_logging_subsystem(&config) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    if let Err(e) = write_pid_file(&args.pidfile) {
        warn!("Unable to write pid file {}: {e}", args.pidfile.display());
    }

    let registry = Registry::default();
    debug!("Using {registry:?}");
    let proxy = match Proxy::start(&config, &registry).await {
        Ok(proxy) => proxy,
        Err(e) => {
            error!("Unable to start proxy: {e}");
            remove_pid_file(&args.pidfile);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    if let Err(e) = watch_signals(shutdown.clone(), proxy.rules().clone(), args.configfile) {
        error!("Unable to install signal handlers: {e}");
        proxy.shutdown().await;
        remove_pid_file(&args.pidfile);
        return ExitCode::FAILURE;
    }

    info!("metricproxy started");
    proxy.run_until(shutdown).await;
    remove_pid_file(&args.pidfile);
    ExitCode::SUCCESS
}
