//! Sampled Load - command line reporter
//!
//! Samples the run queue and prints smoothed 1/5/15 minute load averages.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use sampled_load::{
    DecayFactors, LoadAverager, LoadSnapshot, ProcStatCounterSource, Reading, SamplerConfig,
    SysinfoUtilization, SystemLoadAverager, SAMPLING_PERIOD,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sampled_load")]
#[command(about = "Load averages approximated by sampling the run queue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "Austin Couch")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Do not seed idle averages from CPU utilization
    #[arg(long)]
    no_bootstrap: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the load averages once (default)
    Snapshot(SnapshotArgs),

    /// Print the load averages after every sample
    Watch(WatchArgs),

    /// Show sampling parameters
    Info,
}

#[derive(Args)]
struct SnapshotArgs {
    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: String,

    /// Print the current values instead of waiting for the first sample
    #[arg(long)]
    no_wait: bool,
}

#[derive(Args)]
struct WatchArgs {
    /// Stop after this many samples
    #[arg(short, long)]
    count: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    let config = SamplerConfig::default().with_zero_bootstrap(!cli.no_bootstrap);
    let averager = LoadAverager::with_config(
        ProcStatCounterSource::default(),
        SysinfoUtilization::new(),
        config,
    )
    .context("invalid sampler configuration")?;
    info!(
        zero_bootstrap = averager.config().zero_bootstrap,
        "Sampling every {:?}", SAMPLING_PERIOD
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match &cli.command {
        Some(Commands::Snapshot(args)) => snapshot_command(&averager, args, &cancel).await?,
        Some(Commands::Watch(args)) => watch_command(&averager, args, &cancel).await,
        Some(Commands::Info) => info_command(),
        None => {
            let args = SnapshotArgs {
                format: "pretty".to_string(),
                no_wait: false,
            };
            snapshot_command(&averager, &args, &cancel).await?;
        }
    }

    averager.shutdown();
    Ok(())
}

/// Default filter when `RUST_LOG` is unset. Verbosity flags only raise the
/// level of this crate's own events; dependencies stay at warn.
fn log_directive(cli: &Cli) -> &'static str {
    if cli.debug {
        "warn,sampled_load=debug"
    } else if cli.verbose {
        "warn,sampled_load=info"
    } else {
        "warn"
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_directive(cli)))
        .context("invalid log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))
}

async fn snapshot_command(
    averager: &SystemLoadAverager,
    args: &SnapshotArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let reading = if args.no_wait {
        averager.avg()
    } else {
        info!("Waiting for the first sample...");
        averager.next_avg(cancel).await?
    };

    match args.format.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&reading.value)?;
            println!("{}", json);
            if let Some(err) = &reading.error {
                eprintln!("warning: {}", err);
            }
        }
        "pretty" => print_pretty_reading(&reading),
        _ => {
            error!("Unsupported format: {}. Use 'json' or 'pretty'", args.format);
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn watch_command(
    averager: &SystemLoadAverager,
    args: &WatchArgs,
    cancel: &CancellationToken,
) {
    let mut readings = averager.watch();
    let mut printed = 0;

    info!("Printing load averages every {:?}", SAMPLING_PERIOD);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = readings.next() => match next {
                Some(reading) => print_pretty_reading(&reading),
                None => break,
            },
        }

        printed += 1;
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }
}

fn info_command() {
    let factors = DecayFactors::for_period(SAMPLING_PERIOD);

    println!("Sampled Load");
    println!("============");
    println!();
    println!("Sampling period: {:?}", SAMPLING_PERIOD);
    println!("Decay factors:");
    println!("  1 min:  {:.4}", factors.one);
    println!("  5 min:  {:.4}", factors.five);
    println!("  15 min: {:.4}", factors.fifteen);
    println!();

    let source = ProcStatCounterSource::default();
    println!("Queue length counter: {}", source.path().display());
    match sampled_load::CounterSource::open(source) {
        Ok(_) => println!("  Status: available"),
        Err(err) => println!("  Status: unavailable ({})", err),
    }
}

fn print_pretty_reading(reading: &Reading<LoadSnapshot>) {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let load = reading.value;

    match &reading.error {
        None => println!(
            "{}  load average: {:.2}, {:.2}, {:.2}",
            now, load.load1, load.load5, load.load15
        ),
        Some(err) => println!(
            "{}  load average: {:.2}, {:.2}, {:.2}  ({})",
            now, load.load1, load.load5, load.load15, err
        ),
    }
}
