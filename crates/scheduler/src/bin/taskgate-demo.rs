//! taskgate-demo: drives one rebuild cycle through the scheduler.
//!
//! Initializes a scheduler on the tokio runtime, raises a barrier, buffers a
//! mix of tasks, then either releases the barrier or (with `--skip-reset`)
//! lets the starvation watchdog rescue the backlog. Prints the diagnostics
//! dump at the end.
//!
//! # Usage
//!
//! ```bash
//! taskgate-demo --tasks 6
//! taskgate-demo --skip-reset --starvation-timeout-ms 500 --check-interval-ms 100
//! RUST_LOG=debug taskgate-demo --deadline-ms 50
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use taskgate::{Priority, Scheduler, SchedulerConfig};

/// Run a scheduler through initialize, barrier, backlog and release.
#[derive(Parser, Debug)]
#[command(name = "taskgate-demo", version, about)]
struct Cli {
    /// Starvation timeout in milliseconds (defaults to config/env).
    #[arg(long, env = "TASKGATE_STARVATION_TIMEOUT_MS")]
    starvation_timeout_ms: Option<u64>,

    /// Watchdog check interval in milliseconds (defaults to config/env).
    #[arg(long, env = "TASKGATE_STARVATION_CHECK_INTERVAL_MS")]
    check_interval_ms: Option<u64>,

    /// Number of tasks to buffer behind the barrier.
    #[arg(long, default_value_t = 6)]
    tasks: usize,

    /// Never release the barrier; wait for the watchdog instead.
    #[arg(long)]
    skip_reset: bool,

    /// Give every background task a deadline (0 = none).
    #[arg(long, default_value_t = 0)]
    deadline_ms: u64,
}

impl Cli {
    fn resolve_config(&self) -> anyhow::Result<SchedulerConfig> {
        let mut config = SchedulerConfig::from_env()?;
        if let Some(v) = self.starvation_timeout_ms {
            config.starvation_timeout_ms = v;
        }
        if let Some(v) = self.check_interval_ms {
            config.starvation_check_interval_ms = v;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(?cli, "starting taskgate-demo");

    let config = cli.resolve_config()?;
    config.log_summary();
    let scheduler = Scheduler::on_current_runtime(config.clone());

    let completed = Arc::new(AtomicUsize::new(0));
    scheduler.initialize(|| tracing::info!("initial content loaded"));
    scheduler.submit("rebuild-start", Priority::BarrierBegin, || {
        tracing::info!("session rebuild started")
    });

    let classes = [Priority::Background, Priority::UserFacing, Priority::Immediate];
    for i in 0..cli.tasks {
        let priority = classes[i % classes.len()];
        let label = format!("{}-{}", priority, i);
        let done = Arc::clone(&completed);
        let body = {
            let label = label.clone();
            move || {
                done.fetch_add(1, Ordering::SeqCst);
                tracing::info!(%label, "task ran");
            }
        };

        if cli.deadline_ms > 0 && priority == Priority::Background {
            let fallback_label = label.clone();
            scheduler.submit_with_deadline(
                label,
                priority,
                body,
                move || tracing::warn!(label = %fallback_label, "task timed out"),
                Duration::from_millis(cli.deadline_ms),
            );
        } else {
            scheduler.submit(label, priority, body);
        }
    }
    tracing::info!(backlog = scheduler.backlog_len(), "tasks buffered behind barrier");

    if cli.skip_reset {
        let wait = config.starvation_timeout() + config.starvation_check_interval() * 2;
        tracing::info!(?wait, "not releasing barrier; waiting for watchdog");
        tokio::time::sleep(wait).await;
    } else {
        if cli.deadline_ms > 0 {
            tokio::time::sleep(Duration::from_millis(cli.deadline_ms * 2)).await;
        }
        scheduler.submit("rebuild-done", Priority::BarrierReset, || {
            tracing::info!("session rebuild finished")
        });
    }

    tracing::info!(
        completed = completed.load(Ordering::SeqCst),
        paused = scheduler.is_paused(),
        "demo finished"
    );
    println!("{}", serde_json::to_string_pretty(&scheduler.dump())?);
    Ok(())
}
