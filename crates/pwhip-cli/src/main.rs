mod store;
mod worklist;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use pwhip::WebScraper;

use crate::store::Store;
use crate::worklist::{read_policy_ids, store_policies};

#[derive(Parser)]
#[command(name = "pwhip")]
#[command(about = "A publicwhip.org.uk policy and division scraper", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[arg(
        long,
        default_value = pwhip::DEFAULT_BASE_URL,
        global = true,
        help = "Site that relative links are resolved against"
    )]
    base_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one division page and print the motion with its votes
    Division {
        #[arg(help = "URL or site-relative path of the division page")]
        url: String,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Fetch a policy and every Commons division it lists
    Policy {
        #[arg(help = "Policy id, as in policy.php?id=<ID>")]
        id: u32,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,

        #[arg(
            long,
            default_value_t = 1,
            value_parser = clap::value_parser!(u16).range(1..),
            help = "Division pages fetched at once"
        )]
        concurrency: u16,
    },
    /// Scrape every policy in a worklist into a SQLite database
    Store {
        #[arg(
            long,
            value_name = "FILE",
            help = "JSON array of objects carrying a policy 'id'"
        )]
        policies: PathBuf,

        #[arg(long, default_value = "data.sqlite", help = "SQLite database path")]
        db: String,

        #[arg(
            long,
            help = "Only process the first N policies of the worklist",
            value_parser = clap::value_parser!(u16).range(1..)
        )]
        limit: Option<u16>,

        #[arg(long, help = "Re-scrape policies that are already stored")]
        force: bool,

        #[arg(
            long,
            default_value_t = 1,
            value_parser = clap::value_parser!(u16).range(1..),
            help = "Division pages fetched at once"
        )]
        concurrency: u16,
    },
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    let scraper = WebScraper::with_base_url(&cli.base_url).unwrap_or_else(|e| {
        log::error!("Error creating scraper: {}", e);
        process::exit(1);
    });

    match cli.command {
        Commands::Division { url, format } => {
            let motion = scraper.fetch_division(&url).await.unwrap_or_else(|e| {
                log::error!("Error fetching division: {}", e);
                process::exit(1);
            });

            match format {
                OutputFormat::Json => serialize_json(&motion),
                OutputFormat::Text => {
                    println!("{}", motion);
                    for vote in &motion.votes {
                        println!("{}", vote);
                    }
                }
            }
        }

        Commands::Policy {
            id,
            format,
            concurrency,
        } => {
            let scraper = scraper.with_concurrency(usize::from(concurrency));

            let policy = scraper.fetch_policy_by_id(id).await.unwrap_or_else(|e| {
                log::error!("Error fetching policy {}: {}", id, e);
                process::exit(1);
            });

            match format {
                OutputFormat::Json => serialize_json(&policy),
                OutputFormat::Text => print!("{}", policy),
            }
        }

        Commands::Store {
            policies,
            db,
            limit,
            force,
            concurrency,
        } => {
            let scraper = scraper.with_concurrency(usize::from(concurrency));

            let mut policy_ids = read_policy_ids(&policies).unwrap_or_else(|e| {
                log::error!("Error reading worklist: {:#}", e);
                process::exit(1);
            });
            if let Some(limit) = limit {
                policy_ids.truncate(usize::from(limit));
            }

            let mut store = Store::open(&db).unwrap_or_else(|e| {
                log::error!("Error opening database {}: {:#}", db, e);
                process::exit(1);
            });

            log::info!("Processing {} policies into {}", policy_ids.len(), db);
            let summary = store_policies(&scraper, &mut store, &policy_ids, force).await;
            print!("{}", summary);

            if summary.failed > 0 {
                process::exit(1);
            }
        }
    }
}
