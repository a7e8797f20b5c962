use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use surf_runner::testing::RecordingDriver;
use surf_runner::{
    assert_that, RecordFeed, RunOutcome, Settings, SettingsOverride, Step, StepSequencer,
    StepTimer, TracingObserver,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Run a scripted shopping flow against a dry-run driver that only logs its calls.
#[derive(Parser, Debug)]
#[command(name = "surf-runner", version, about)]
struct Args {
    /// Number of iterations to run
    #[arg(short, long, default_value_t = 1)]
    iterations: u32,

    /// Make the step at this position (1-based) fail
    #[arg(long)]
    fail_at: Option<usize>,

    /// Cancel the current run after this many milliseconds
    #[arg(long)]
    cancel_after_ms: Option<u64>,

    /// JSON settings file
    #[arg(short, long)]
    settings: Option<PathBuf>,
}

fn demo_steps(fail_at: Option<usize>) -> Vec<Step> {
    let fails = move |position: usize| fail_at == Some(position);

    vec![
        Step::once("open home page", move |driver, _| async move {
            driver
                .action("navigate", driver.driver().current_url())
                .await?;
            assert_that(!fails(1), "home page shows the catalogue")?;
            Ok(())
        }),
        Step::new("search", move |driver, record| async move {
            let term = record["term"].as_str().unwrap_or("socks").to_string();
            info!(term = %term, "searching");
            driver
                .action("type search term", tokio::time::sleep(Duration::from_millis(20)))
                .await;
            assert_that(!fails(2), format!("results for {}", term))?;
            Ok(())
        })
        .with_overrides(SettingsOverride::default().with_wait_timeout(5000)),
        Step::new("add to cart", move |driver, _| async move {
            driver
                .action("click add", tokio::time::sleep(Duration::from_millis(20)))
                .await;
            if fails(3) {
                anyhow::bail!("cart service returned 503");
            }
            Ok(())
        }),
        Step::new("checkout", move |driver, _| async move {
            driver
                .action("submit order", driver.driver().take_screenshot("order"))
                .await?;
            assert_that(!fails(4), "order confirmation visible")?;
            Ok(())
        }),
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = match &args.settings {
        Some(path) => Settings::load(path).await?,
        None => Settings {
            step_delay_ms: 50,
            ..Default::default()
        },
    };

    let timer = Arc::new(StepTimer::new());
    let records = RecordFeed::new(vec![
        json!({"term": "socks"}),
        json!({"term": "hats"}),
        json!({"term": "scarves"}),
    ])
    .circular(true);

    let mut sequencer = StepSequencer::new(
        Arc::new(RecordingDriver::new()),
        Arc::new(records),
        settings,
    )
    .with_steps(demo_steps(args.fail_at))
    .with_observer(TracingObserver)
    .with_shared_observer(timer.clone());
    sequencer.on_cancel(|| warn!("run cancelled by user"));

    for iteration in 1..=args.iterations {
        let canceller = args.cancel_after_ms.map(|ms| {
            let handle = sequencer.cancel_handle();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                handle.cancel();
            })
        });

        let result = sequencer.run(iteration).await;
        if let Some(canceller) = canceller {
            canceller.abort();
        }

        match result {
            Ok(RunOutcome::Cancelled) => {
                warn!(iteration, "iteration cancelled");
                break;
            }
            Ok(outcome) => info!(iteration, ?outcome, "iteration finished"),
            Err(e) if e.is_fatal() => {
                error!(iteration, "{}", e);
                break;
            }
            Err(e) => error!(iteration, "{}", e),
        }

        for shot in sequencer.screenshots() {
            info!(name = %shot.name, bytes = shot.data.len(), "screenshot captured");
        }
    }

    sequencer.shutdown().await?;

    for timing in timer.timings().await {
        info!(
            "#{} {:<16} {:>6} ms",
            timing.iteration,
            timing.step,
            timing.duration.as_millis()
        );
    }
    info!("Total step time: {} ms", timer.total().await.as_millis());

    Ok(())
}
