use std::sync::Arc;

use anyhow::{Context, bail};
use tokio_stream::StreamExt;

use print_job::config::PrintJobConfig;
use print_job::context::TaskThread;
use print_job::document::PagesSource;
use print_job::events::NotificationBus;
use print_job::job::PrintJob;
use print_job::settings::PrintSettings;
use print_job::worker::{PrinterQuery, WorkerOptions};

/// Source standing in for the page being printed.
struct DemoSource {
    title: String,
}

impl PagesSource for DemoSource {
    fn source_name(&self) -> String {
        self.title.clone()
    }
}

/// Run `f` on the job's coordinating context from async code.
async fn on_coordinator<F>(job: &Arc<PrintJob>, f: F) -> anyhow::Result<()>
where
    F: FnOnce(&Arc<PrintJob>) + Send + 'static,
{
    let job = Arc::clone(job);
    tokio::task::spawn_blocking(move || {
        let runner = job.coordinator().clone();
        runner.invoke(move || f(&job))
    })
    .await
    .context("coordinator call panicked")??;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = PrintJobConfig::from_env();

    eprintln!("🖨  print-job v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Device: {}", config.device_name);
    eprintln!("   Pages: {} ({:?} each)", config.pages, config.page_delay);
    eprintln!(
        "   Restricted shutdown wait: {}",
        if config.restricted_wait { "on" } else { "off" }
    );
    if let Some(after) = config.cancel_after {
        eprintln!("   Cancel after: {:?}", after);
    }
    eprintln!();

    // ── Execution contexts ───────────────────────────────────────────────
    let coordinator = TaskThread::spawn(config.coordinator_thread_name.clone())
        .context("Failed to start coordinating context")?;
    let bus = NotificationBus::new(config.event_capacity);

    let query = PrinterQuery::spawn(
        config.worker_thread_name.clone(),
        WorkerOptions {
            page_delay: config.page_delay,
            fail_on_page: None,
        },
        PrintSettings::new(config.device_name.clone()),
        1,
    )
    .context("Failed to start worker context")?;

    // ── Job ──────────────────────────────────────────────────────────────
    let job = PrintJob::with_hazard(
        coordinator.runner().clone(),
        Arc::clone(&bus),
        config.shutdown_hazard(),
    );
    let mut events = bus.subscribe_to(job.id()).into_stream();

    let pages = config.pages;
    on_coordinator(&job, move |job| {
        let mut query = query;
        let source = Arc::new(DemoSource {
            title: "demo.pdf".to_string(),
        });
        job.initialize(&mut query, source, pages);
    })
    .await?;

    // Start waiting before the job is dispatched.
    let flush = {
        let job = Arc::clone(&job);
        let timeout = config.flush_timeout;
        tokio::task::spawn_blocking(move || job.flush_and_wait(timeout))
    };
    on_coordinator(&job, |job| job.start_printing()).await?;

    if let Some(after) = config.cancel_after {
        let job = Arc::clone(&job);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Err(e) = on_coordinator(&job, |job| job.cancel()).await {
                tracing::warn!(error = %e, "Failed to cancel print job");
            }
        });
    }

    // ── Event stream ─────────────────────────────────────────────────────
    loop {
        match tokio::time::timeout(config.flush_timeout, events.next()).await {
            Ok(Some(event)) => {
                println!("{}", serde_json::to_string(&event.summary())?);
                if event.kind.is_terminal() {
                    break;
                }
            }
            Ok(None) => bail!("Event bus closed before the job finished"),
            Err(_) => {
                tracing::warn!("No job event within {:?}, canceling", config.flush_timeout);
                on_coordinator(&job, |job| job.cancel()).await?;
                break;
            }
        }
    }

    let flushed = flush.await.context("flush wait panicked")?;
    let torn_down = {
        let job = Arc::clone(&job);
        let timeout = config.flush_timeout;
        tokio::task::spawn_blocking(move || job.wait_for_teardown(timeout))
            .await
            .context("teardown wait panicked")?
    };
    if !torn_down {
        bail!("Worker teardown did not complete within {:?}", config.flush_timeout);
    }

    eprintln!();
    eprintln!("   Status: {}", job.status());
    eprintln!("   Flushed: {}", flushed);

    drop(job);
    tokio::task::spawn_blocking(move || coordinator.stop())
        .await
        .context("coordinator shutdown panicked")?;

    Ok(())
}
