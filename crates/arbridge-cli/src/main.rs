//! `arbridge` – ARCore sensor bridge.
//!
//! Reads sensor readings as JSON lines on stdin (see [`feed`]), fuses them
//! and republishes odometry, IMU and fix messages at a fixed rate on the
//! in-process event bus and, when enabled, to rosbridge WebSocket clients.
//!
//! `arbridge init` writes a default `~/.arbridge/config.toml` and exits.
//! Ctrl-C or end of input stops the bridge after the current publish tick.

mod config;
mod feed;

use colored::Colorize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use arbridge_middleware::{EventBus, RosbridgeRelay, Topic};
use arbridge_runtime::telemetry::{TelemetryConfig, init_tracing};
use arbridge_runtime::{PublishScheduler, SchedulerStats, SensorAggregator, ShutdownHandle};
use arbridge_types::BridgeError;

fn main() {
    let telemetry = init_tracing(TelemetryConfig::from_env("arbridge"));

    print_banner();
    if telemetry.is_exporting() {
        println!("  OpenTelemetry span export {}", "enabled".green());
    }

    if std::env::args().nth(1).as_deref() == Some("init") {
        write_default_config();
        return;
    }

    let mut cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            println!("  No config file found; using defaults (`arbridge init` writes one).");
            config::Config::default()
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);

    // Tracing is installed before the runtime exists; see telemetry.
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            std::process::exit(1);
        }
    };

    let outcome = runtime.block_on(run(cfg));
    // A pending stdin read would otherwise hold the runtime open.
    runtime.shutdown_timeout(Duration::from_millis(250));

    match outcome {
        Ok(stats) => {
            println!(
                "\n  {} {} ticks, {} messages published, {} failed",
                "✓".green().bold(),
                stats.ticks,
                stats.published,
                stats.failures
            );
        }
        Err(e) => {
            println!("{}: {}", "Bridge error".red(), e);
            std::process::exit(1);
        }
    }
}

async fn run(cfg: config::Config) -> Result<SchedulerStats, BridgeError> {
    let fusion = cfg.fusion_config()?;
    let schedule = cfg.scheduler_config()?;

    let aggregator = Arc::new(SensorAggregator::new(fusion));
    let bus = Arc::new(EventBus::default().with_prefix(cfg.topic_prefix.clone()));

    if cfg.relay_enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], cfg.relay_port));
        let relay = RosbridgeRelay::new(bus.clone());
        tokio::spawn(async move {
            if let Err(e) = relay.run(addr).await {
                error!(error = %e, "rosbridge relay stopped");
            }
        });
        println!("  rosbridge relay on {}", format!("ws://{addr}").bold());
    }

    let shutdown = ShutdownHandle::new();
    let on_ctrlc = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping after the current tick …".yellow().bold());
        on_ctrlc.trigger();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop the bridge by closing stdin");
    }

    let scheduler = PublishScheduler::new(aggregator.clone(), bus.clone(), schedule);
    let topics = Topic::ALL.map(|t| bus.topic_name(t));
    info!(rate_hz = cfg.publish_rate_hz, topics = ?topics, "bridge started");
    let publisher = tokio::spawn(scheduler.run(shutdown.subscribe()));

    read_feed(&aggregator, &shutdown).await;
    shutdown.trigger();

    publisher
        .await
        .map_err(|e| BridgeError::Channel(format!("publish loop ended abnormally: {e}")))
}

/// Feed stdin lines into `aggregator` until EOF or shutdown.
async fn read_feed(aggregator: &SensorAggregator, shutdown: &ShutdownHandle) {
    let mut stop = shutdown.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let (mut line_no, mut accepted, mut skipped) = (0u64, 0u64, 0u64);

    loop {
        if *stop.borrow() {
            break;
        }
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            next = lines.next_line() => match next {
                Ok(Some(line)) => {
                    line_no += 1;
                    match feed::parse_line(&line) {
                        Ok(Some(record)) => match feed::apply(record, aggregator) {
                            Ok(()) => accepted += 1,
                            // The aggregator already logged the rejection.
                            Err(e) => {
                                skipped += 1;
                                debug!(line = line_no, error = %e, "feed sample rejected");
                            }
                        },
                        Ok(None) => {}
                        Err(e) => {
                            skipped += 1;
                            warn!(line = line_no, error = %e, "malformed feed line skipped");
                        }
                    }
                }
                Ok(None) => {
                    info!("end of sensor feed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "sensor feed read error");
                    break;
                }
            },
        }
    }

    info!(lines = line_no, accepted, skipped, "sensor feed closed");
}

fn write_default_config() {
    let path = config::config_path();
    if path.exists() {
        println!("  Config already exists at {}", path.display().to_string().bold());
        return;
    }
    match config::save(&config::Config::default()) {
        Ok(()) => println!(
            "  {} Config saved to {}",
            "✓".green().bold(),
            path.display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

fn print_banner() {
    println!();
    println!("  {} {}",
        "arbridge".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  ARCore sensor bridge for ROS");
    println!();
}
