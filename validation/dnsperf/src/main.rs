//! DNS load generator CLI.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use dnsperf::{
    DnsClient, LoadConfig, LoadError, LoadRunner, RequestFeed, ResultsReport, Summary, Transport,
    FEED_BUFFER,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "dnsperf")]
#[command(about = "Replay a query list against a DNS server and report throughput and latency")]
struct Args {
    /// Scenario YAML file; flags below override its values
    #[arg(long, env = "DNSPERF_CONFIG")]
    config: Option<PathBuf>,

    /// Server to query (name or IP address)
    #[arg(short = 's', long, env = "DNSPERF_SERVER")]
    server: Option<String>,

    /// Server port
    #[arg(short = 'p', long, env = "DNSPERF_PORT")]
    port: Option<u16>,

    /// Transport mode
    #[arg(short = 'm', long = "mode", value_enum)]
    transport: Option<Transport>,

    /// Input file, one `name type [subnet]` per line
    #[arg(short = 'd', long, env = "DNSPERF_DATAFILE")]
    datafile: Option<PathBuf>,

    /// Number of concurrent clients
    #[arg(short = 'c', long)]
    clients: Option<usize>,

    /// Run through the input at most this many times
    #[arg(short = 'n', long)]
    passes: Option<u64>,

    /// Per-query timeout in seconds
    #[arg(short = 't', long)]
    timeout: Option<u64>,

    /// Stop after this many seconds
    #[arg(short = 'l', long = "limit")]
    time_limit: Option<u64>,

    /// Limit the aggregate rate to this many queries per second
    #[arg(short = 'Q', long = "max-qps")]
    max_qps: Option<f64>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Hide the progress bar
    #[arg(short = 'q', long)]
    quiet: bool,
}

impl Args {
    fn load_config(&self) -> Result<LoadConfig> {
        let mut config = match &self.config {
            Some(path) => LoadConfig::from_file(path)
                .with_context(|| format!("loading scenario {}", path.display()))?,
            None => LoadConfig::default(),
        };

        // Apply overrides
        if let Some(server) = &self.server {
            config.server = server.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        if let Some(datafile) = &self.datafile {
            config.datafile = datafile.clone();
        }
        if let Some(clients) = self.clients {
            config.workers = clients;
        }
        if let Some(passes) = self.passes {
            config.passes = passes;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(limit) = self.time_limit {
            config.duration_secs = Some(limit);
        }
        if let Some(qps) = self.max_qps {
            config.max_qps = Some(qps);
        }

        if config.datafile.as_os_str().is_empty() {
            anyhow::bail!("no input file given (use -d or set datafile in the scenario)");
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // Logs go to stderr so JSON and CSV reports stay clean on stdout.
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn progress_bar(total: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {per_sec} {msg}")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args);

    let config = args.load_config()?;
    let feed = RequestFeed::from_file(&config.datafile, config.passes)?;
    let server = config.resolve_server().await?;

    info!(
        server = %server,
        transport = %config.transport,
        queries = feed.queries(),
        passes = config.passes,
        "Loaded query input"
    );

    let total = feed.total();
    let client = DnsClient::new(server, config.transport, config.timeout());
    let (jobs, producer) = feed.spawn(FEED_BUFFER);

    let workers = config.workers;
    let mut runner = LoadRunner::new(config, Arc::new(client));
    if !args.quiet {
        runner = runner.with_progress(progress_bar(total)?);
    }

    let transport = runner.config().transport.to_string();
    let report = match runner.run(jobs).await {
        Ok(report) => report,
        Err(LoadError::WorkerLost {
            received,
            expected,
            partial,
        }) => {
            let summary = partial.summary(server.to_string(), transport, workers);
            eprintln!("Partial results from {received} of {expected} clients:");
            print_summary(&summary, args.output, true)?;
            anyhow::bail!("{} of {} clients failed", expected - received, expected);
        }
        Err(e) => return Err(e.into()),
    };

    let produced = producer.await.context("query producer task failed")?;
    debug!(produced, "Producer finished");

    if report.no_data {
        eprintln!("No statistics collected / no requests found");
        return Ok(());
    }

    let summary = report.stats.summary(server.to_string(), transport, workers);
    print_summary(&summary, args.output, report.interrupted)
}

fn print_summary(summary: &Summary, output: OutputFormat, partial: bool) -> Result<()> {
    match output {
        OutputFormat::Json => {
            println!("{}", ResultsReport::format_json(summary)?);
        }
        OutputFormat::Csv => {
            println!("{}", ResultsReport::csv_header());
            println!("{}", ResultsReport::format_csv(summary));
        }
        OutputFormat::Table => {
            if partial {
                println!("Interrupted; partial results:");
            }
            println!("{}", ResultsReport::format_table(summary));
        }
    }
    Ok(())
}
