use clap::Parser;
use env_logger::Env;
use gtfsdb::config::ImporterConfig;
use gtfsdb::db;
use gtfsdb::import::{AgencyFeed, FeedDirectory, FeedImporter, ImportQueue};
use serde_json::json;

/// Import GTFS feed directories into Postgres.
///
/// Each feed is imported atomically per agency: a failed feed leaves that
/// agency's previous data in place and does not stop the remaining feeds.
#[derive(Parser, Debug)]
#[command(name = "gtfsdb", version, about)]
struct Cli {
    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Feeds to import, as KEY=DIR pairs. KEY names the agency slot in the
    /// database, DIR is a directory of extracted feed files.
    #[arg(value_name = "KEY=DIR", required = true)]
    feeds: Vec<String>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut feeds = Vec::with_capacity(cli.feeds.len());
    for spec in &cli.feeds {
        let Some((key, dir)) = spec.split_once('=') else {
            log::error!("invalid feed '{}', expected KEY=DIR", spec);
            std::process::exit(2);
        };
        feeds.push(AgencyFeed {
            agency_key: key.to_string(),
            directory: FeedDirectory::new(dir),
        });
    }

    let pool = match db::connect(&cli.database_url).await {
        Ok(pool) => pool,
        Err(err) => {
            log::error!("database connection failed: {}", err);
            std::process::exit(1);
        }
    };
    if let Err(err) = db::run_migrations(&pool).await {
        log::error!("database migrations failed: {}", err);
        std::process::exit(1);
    }

    let config = ImporterConfig::from_env();
    let queue = ImportQueue::new(FeedImporter::new(pool, config));
    let outcomes = queue.import_all(feeds).await;

    let mut failed = false;
    let report: Vec<serde_json::Value> = outcomes
        .iter()
        .map(|outcome| match &outcome.result {
            Ok(stats) => json!({
                "agency_key": outcome.agency_key,
                "status": "imported",
                "stats": stats,
            }),
            Err(err) => {
                failed = true;
                json!({
                    "agency_key": outcome.agency_key,
                    "status": "failed",
                    "error": err.to_string(),
                })
            }
        })
        .collect();

    println!(
        "{}",
        serde_json::to_string_pretty(&report).unwrap_or_default()
    );

    if failed {
        std::process::exit(1);
    }
}
