use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::{select, tick, unbounded};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::info;
use trafficlight::logging::{LogFormat, init_logging};
use trafficlight::{ControllerConfig, ControllerStats, Phase, PhaseController, RetrievalOrder};

fn parse_order(s: &str) -> Result<RetrievalOrder, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "lifo" => Ok(RetrievalOrder::Lifo),
        "fifo" => Ok(RetrievalOrder::Fifo),
        other => Err(format!("unknown order: {other} (expected lifo or fifo)")),
    }
}

#[derive(Parser, Debug)]
#[command(name = "trafficlight")]
#[command(about = "Traffic-light phase controller driven by a blocking queue", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Emit logs as newline-delimited JSON
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone, Debug)]
struct TimingArgs {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, help = "Lower bound of a phase in milliseconds")]
    cycle_min_ms: Option<u64>,
    #[arg(long, help = "Upper bound of a phase in milliseconds")]
    cycle_max_ms: Option<u64>,
    #[arg(long)]
    poll_ms: Option<u64>,
    #[arg(long, default_value_t = false)]
    redraw_each_cycle: bool,
    #[arg(long, value_parser = parse_order)]
    order: Option<RetrievalOrder>,
    #[arg(long, help = "Max queued phases (0 = unbounded)")]
    queue_depth: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cycle the light and wait for a phase (green by default)
    Run {
        #[arg(long, default_value_t = 20)]
        duration_secs: u64,
        /// Phase the waiter thread blocks on: red or green
        #[arg(long, default_value = "green")]
        wait_for: Phase,
        #[arg(long, default_value_t = 50)]
        sample_ms: u64,
        #[command(flatten)]
        timing: TimingArgs,
    },
    /// Print the effective config as JSON
    ShowConfig {
        #[command(flatten)]
        timing: TimingArgs,
    },
}

fn build_controller_config(timing: &TimingArgs) -> anyhow::Result<ControllerConfig> {
    let mut config = match &timing.config {
        Some(path) => ControllerConfig::from_json_file(path)?,
        None => ControllerConfig::default(),
    };

    if let Some(ms) = timing.cycle_min_ms {
        config.cycle_min = Duration::from_millis(ms);
    }
    if let Some(ms) = timing.cycle_max_ms {
        config.cycle_max = Duration::from_millis(ms);
    }
    if let Some(ms) = timing.poll_ms {
        config.poll_interval = Duration::from_millis(ms);
    }
    if timing.redraw_each_cycle {
        config.redraw_each_cycle = true;
    }
    if let Some(order) = timing.order {
        config.queue.order = order;
    }
    if let Some(depth) = timing.queue_depth {
        config.queue.capacity = if depth == 0 { None } else { Some(depth) };
    }

    config.validate().context("invalid timing flags")?;
    Ok(config)
}

fn run(
    config: ControllerConfig,
    wait_for: Phase,
    duration: Duration,
    sample: Duration,
) -> anyhow::Result<()> {
    let controller = Arc::new(PhaseController::with_config(config)?);
    controller.simulate()?;

    let (release_tx, release_rx) = unbounded::<Instant>();
    let waiter_stop = Arc::new(AtomicBool::new(false));
    let waiter = {
        let controller = Arc::clone(&controller);
        let stop = Arc::clone(&waiter_stop);
        std::thread::Builder::new()
            .name("phase-waiter".to_string())
            .spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    if controller.wait_for_phase_timeout(wait_for, Duration::from_millis(250))
                        && release_tx.send(Instant::now()).is_err()
                    {
                        break;
                    }
                }
            })
            .context("failed spawning phase waiter")?
    };

    let started = Instant::now();
    let deadline = started + duration;
    let ticker = tick(sample);
    let mut last_phase = controller.current_phase();
    let mut observed_changes = 0u64;
    let mut waits_released = 0u64;
    let mut green_samples = 0u64;
    info!(phase = %last_phase, config = ?controller.config(), "light started");

    loop {
        select! {
            recv(release_rx) -> msg => {
                if let Ok(at) = msg {
                    waits_released += 1;
                    info!(phase = %wait_for, elapsed = ?at.duration_since(started), "waiter released");
                }
            }
            recv(ticker) -> _ => {
                let phase = controller.current_phase();
                if phase.is_green() {
                    green_samples += 1;
                }
                if phase != last_phase {
                    info!(from = %last_phase, to = %phase, "phase changed");
                    last_phase = phase;
                    observed_changes += 1;
                }
                if Instant::now() >= deadline {
                    break;
                }
            }
        }
    }

    waiter_stop.store(true, Ordering::Release);
    waiter
        .join()
        .map_err(|_| anyhow!("phase waiter thread panicked"))?;
    controller.stop();

    print_stats(
        &controller.stats(),
        started.elapsed(),
        observed_changes,
        waits_released,
        green_samples,
    );
    Ok(())
}

fn print_stats(
    stats: &ControllerStats,
    elapsed: Duration,
    observed_changes: u64,
    waits_released: u64,
    green_samples: u64,
) {
    println!("duration_sec={:.3}", elapsed.as_secs_f64());
    println!("final_phase={}", stats.phase);
    println!("transitions={}", stats.transitions);
    println!("observed_changes={}", observed_changes);
    println!("waits_released={}", waits_released);
    println!("green_samples={}", green_samples);
    println!("queue.sent={}", stats.queue.sent);
    println!("queue.received={}", stats.queue.received);
    println!("queue.dropped={}", stats.queue.dropped);
    println!("queue.max_depth={}", stats.queue.max_depth);
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Human
    };
    init_logging(format, cli.verbose);

    match cli.command {
        Command::Run {
            duration_secs,
            wait_for,
            sample_ms,
            timing,
        } => {
            let config = build_controller_config(&timing)?;
            run(
                config,
                wait_for,
                Duration::from_secs(duration_secs),
                Duration::from_millis(sample_ms.max(1)),
            )?;
        }
        Command::ShowConfig { timing } => {
            let config = build_controller_config(&timing)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
