extern crate clap;

use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::Verbosity;
use colored::Colorize;
use log::{debug, info};
use speedprobe::config::EngineConfig;
use speedprobe::errors::{exit_codes, ErrorKind, ProbeError};
use speedprobe::lookup::LookupClient;
use speedprobe::results::{IpInfo, MeasurementResult, Source};
use speedprobe::speedtest::engine::{MeasurementEngine, SpeedTestService};
use speedprobe::storage::{JsonFileStore, ResultStore};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (rev ",
    env!("SPEEDPROBE_BUILD_GIT_HASH"),
    ")"
);

const DEFAULT_STORE: &str = "speedprobe-results.json";
const DEFAULT_OWNER: &str = "local";
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(author, version, long_version = LONG_VERSION, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    verbose: Verbosity,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Measure latency, download and upload, then store the result
    Run(RunArgs),
    /// List stored results for an owner, newest first
    History {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        json: bool,
        #[arg(long, default_value = DEFAULT_STORE)]
        store: PathBuf,
    },
    /// Delete a stored result
    Delete {
        id: Uuid,
        #[arg(long, default_value = DEFAULT_STORE)]
        store: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Measure throughput over several parallel connections
    #[arg(long)]
    multi: bool,
    #[arg(long, default_value = DEFAULT_OWNER)]
    owner: String,
    /// ISP name; with --ip, --country and --region this skips the lookup
    #[arg(long)]
    isp: Option<String>,
    #[arg(long)]
    ip: Option<String>,
    #[arg(long)]
    country: Option<String>,
    #[arg(long)]
    region: Option<String>,
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
    #[arg(long, default_value = DEFAULT_STORE)]
    store: PathBuf,
    /// JSON engine configuration; omitted keys keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seed for synthetic fallback values
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(cli.verbose.log_level_filter())
        .format_timestamp_millis()
        .init();

    let code = match execute(cli.command).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".bold().red(), e);
            e.exit_code()
        }
    };

    std::process::exit(code);
}

async fn execute(command: Command) -> Result<(), ProbeError> {
    match command {
        Command::Run(args) => run(args).await,
        Command::History { owner, json, store } => history(&owner, json, &store).await,
        Command::Delete { id, store } => {
            JsonFileStore::new(store).delete(&id).await?;
            println!("{} {}", "Deleted".bold().white(), id.to_string().bright_blue());
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> Result<(), ProbeError> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let ip_info = ip_info(&args).await?;
    debug!("Client metadata: {:?}", ip_info);

    let service = SpeedTestService::new(
        MeasurementEngine::over_http(config),
        JsonFileStore::new(&args.store),
    );
    let result = service.run_measurement(&args.owner, &ip_info, args.multi).await?;
    info!("Stored in {}", service.store().path().display());

    if args.json {
        print_json(&result)
    } else {
        print_result(&result);
        Ok(())
    }
}

async fn ip_info(args: &RunArgs) -> Result<IpInfo, ProbeError> {
    let given = [&args.isp, &args.ip, &args.country, &args.region];

    if given.iter().any(|field| field.is_some()) {
        let field = |value: &Option<String>| value.clone().unwrap_or_default();
        return Ok(IpInfo {
            isp: field(&args.isp),
            ip: field(&args.ip),
            country: field(&args.country),
            region: field(&args.region),
        });
    }

    Ok(LookupClient::new(LOOKUP_TIMEOUT)?.ip_info_or_default().await)
}

async fn history(owner: &str, json: bool, store: &Path) -> Result<(), ProbeError> {
    let results = JsonFileStore::new(store).list_by_owner(owner).await?;

    if json {
        return print_json(&results);
    }

    if results.is_empty() {
        println!("No results for {}", owner.bright_blue());
        return Ok(());
    }

    for result in &results {
        println!(
            "{}  {}  {} {}  {} {}  {} {}",
            result.created_at.format("%Y-%m-%d %H:%M:%S").to_string().white(),
            result.id.to_string().bright_blue(),
            "down".bold(),
            format!("{:.2} Mbps", result.download_mbps).bright_cyan(),
            "up".bold(),
            format!("{:.2} Mbps", result.upload_mbps).bright_cyan(),
            "ping".bold(),
            format!("{:.2} ms", result.ping_ms).bright_cyan(),
        );
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), ProbeError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| {
        ProbeError::new(ErrorKind::Unknown, "cannot encode output").with_source(e)
    })?;
    println!("{}", text);
    Ok(())
}

fn source_tag(source: Source) -> colored::ColoredString {
    if source.is_synthetic() {
        "(synthetic)".yellow()
    } else {
        format!("({})", source).dimmed()
    }
}

fn print_result(result: &MeasurementResult) {
    let provenance = result.provenance;

    println!("{} {}", "Result:".bold().white(), result.id.to_string().bright_blue());
    if !result.ip_address.is_empty() {
        println!(
            "{} {} {}",
            "Your IP:".bold().white(),
            result.ip_address.bright_blue(),
            format!("({}, {} {})", result.isp_name, result.region, result.country).bright_blue()
        );
    }
    println!(
        "{} {:.2} ms {}",
        "Latency:".bold().white(),
        result.ping_ms,
        source_tag(provenance.latency)
    );
    println!("{} {:.2} ms", "Jitter:".bold().white(), result.jitter_ms);
    println!(
        "{} {} {}",
        "Download speed:".bold().white(),
        format!("{:.2} Mbps", result.download_mbps).bright_cyan(),
        source_tag(provenance.download)
    );
    println!(
        "{} {} {}",
        "Upload speed:".bold().white(),
        format!("{:.2} Mbps", result.upload_mbps).bright_cyan(),
        source_tag(provenance.upload)
    );
}
