//! fairq CLI: dispatch an input file across a pool of in-process workers.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fairq::config::Config;
use fairq::coordinator::Coordinator;
use fairq::engine::{ControlConfig, ControlHandle, ControlPlane};
use fairq::model::{Outbound, Record, WorkerId};
use fairq::sink::{Collector, ResultSink};
use fairq::source::LineSource;
use fairq::telemetry::{TelemetryConfig, init_telemetry};
use fairq::transport::ChannelTransport;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "fairq", about = "Fair work dispatch across a worker pool")]
struct Cli {
    /// TOML config file (overrides environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dispatch every record of a file and print the results
    Run {
        /// Input file, one record per line
        #[arg(long)]
        input: PathBuf,
        /// Number of workers to start
        #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u32).range(1..))]
        workers: u32,
        /// Delay between worker registrations, in milliseconds
        #[arg(long, default_value_t = 0)]
        join_delay_ms: u64,
        /// Maximum working items per worker
        #[arg(long)]
        cap: Option<usize>,
        /// Records per read
        #[arg(long)]
        batch_size: Option<usize>,
        /// Field delimiter within a line
        #[arg(long)]
        delimiter: Option<char>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    match cli.command {
        Command::Run {
            input,
            workers,
            join_delay_ms,
            cap,
            batch_size,
            delimiter,
        } => {
            let config = Config {
                admission_cap: cap.unwrap_or(config.admission_cap),
                batch_size: batch_size.unwrap_or(config.batch_size),
                field_delimiter: delimiter.unwrap_or(config.field_delimiter),
                ..config
            };
            config.validate()?;
            cmd_run(config, input, workers, Duration::from_millis(join_delay_ms)).await
        }
        Command::Config => {
            println!("admission_cap:    {}", config.admission_cap);
            println!("batch_size:       {}", config.batch_size);
            println!("field_delimiter:  {:?}", config.field_delimiter);
            println!("journal_capacity: {}", config.journal_capacity);
            println!(
                "otel_endpoint:    {}",
                config.otel_endpoint.as_deref().unwrap_or("-")
            );
            println!("log_level:        {}", config.log_level);
            Ok(())
        }
    }
}

async fn cmd_run(
    config: Config,
    input: PathBuf,
    workers: u32,
    join_delay: Duration,
) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "fairq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let started = chrono::Utc::now();
    let source = LineSource::open(&input, config.batch_size, config.field_delimiter).await?;

    let transport = ChannelTransport::new();
    let coordinator = Coordinator::new(transport.clone(), config.admission_cap)
        .with_journal_capacity(config.journal_capacity)
        .with_welcome(serde_json::json!({
            "delimiter": config.field_delimiter.to_string(),
            "started_at": started.to_rfc3339(),
        }));
    let control = ControlPlane::new(
        coordinator,
        ControlConfig {
            exit_when_drained: true,
        },
    );
    let handle = control.handle();

    let ctrl = handle.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrl.shutdown();
    });

    let (results_tx, mut results_rx) = mpsc::unbounded_channel();
    let pool = tokio::spawn(spawn_workers(
        workers,
        join_delay,
        transport,
        handle,
        results_tx,
    ));

    let coordinator = control.run(source).await?;

    // Every completion has been reported, so every result is already queued.
    for worker in pool.await? {
        worker.abort();
    }
    let mut sink = Collector::stdout();
    while let Some(result) = results_rx.recv().await {
        sink.collect(result);
    }
    sink.print_all()?;

    let snapshot = coordinator.snapshot();
    let elapsed = chrono::Utc::now() - started;
    info!(
        elapsed_ms = elapsed.num_milliseconds(),
        pending = snapshot.pending,
        working = snapshot.working,
        buffered = snapshot.buffered,
        "finished"
    );
    Ok(())
}

/// Register `count` demo workers, `delay` apart.
async fn spawn_workers(
    count: u32,
    delay: Duration,
    transport: ChannelTransport,
    handle: ControlHandle,
    results: mpsc::UnboundedSender<String>,
) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::with_capacity(count as usize);
    for n in 0..count {
        if n > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let id = WorkerId::new();
        let rx = transport.connect(id, handle.inbound());
        tasks.push(tokio::spawn(run_worker(
            id,
            rx,
            handle.clone(),
            results.clone(),
        )));
        handle.worker_joined(id);
    }
    tasks
}

async fn run_worker(
    id: WorkerId,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    handle: ControlHandle,
    results: mpsc::UnboundedSender<String>,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            Outbound::Welcome { data } => debug!(worker = %id, %data, "welcomed"),
            Outbound::Chunk { records } => {
                debug!(worker = %id, size = records.len(), "processing chunk");
                for record in &records {
                    let _ = results.send(summarize(id, record));
                }
                handle.chunk_completed(id, records.len());
            }
        }
    }
}

fn summarize(worker: WorkerId, record: &Record) -> String {
    let bytes: usize = record.fields().iter().map(String::len).sum();
    format!(
        "{:<16}  {:>3} fields  {:>6} bytes  (worker {worker})",
        record.key(),
        record.fields().len(),
        bytes
    )
}
