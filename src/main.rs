use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use betafarm::feeds::{
    FeedImporter, HttpFetcher, HttpHubClient, HubSettings, ImportReport, ImportTarget, LeaseRenewer,
    NotificationHandler, RetryPolicy, SubscriptionManager, TaskQueue, TaskRunner, TaskWorker,
};
use betafarm::web::{AppState, WebServer};
use betafarm::{Config, Database};

#[derive(Parser, Debug)]
#[command(name = "betafarm", about = "Project feed subscriptions and activity timelines")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web server, the task worker and the lease renewer.
    Serve,
    /// Pull a feed once and store its items as entries.
    Importfeed {
        /// URL of the RSS or Atom feed.
        feed_url: String,
        /// Project slug, or numeric link ID.
        target: String,
        /// Import at most this many items.
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match Config::load_with_env(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", args.config.display());
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    if let Err(e) = betafarm::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        betafarm::logging::init_console_only(&config.logging.level);
    }

    let result = match args.command {
        Command::Serve => serve(config).await,
        Command::Importfeed {
            feed_url,
            target,
            limit,
        } => {
            import_feed(&config, &feed_url, &target, limit).await;
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("Fatal: {}", e);
        std::process::exit(1);
    }
}

async fn serve(config: Config) -> betafarm::Result<()> {
    info!("Betafarm starting");

    let db = Database::open(&config.database.path).await?;
    let fetcher = Arc::new(HttpFetcher::new(&config.push)?);
    let hub = Arc::new(HttpHubClient::new(&config.push)?);
    let settings = HubSettings::from_config(&config.push, &config.server);
    let manager = Arc::new(SubscriptionManager::new(db.clone(), fetcher, hub, settings));

    let (queue, receiver) = TaskQueue::new();
    let runner = Arc::new(TaskRunner::new(
        Arc::clone(&manager),
        NotificationHandler::new(db.clone()),
        RetryPolicy::from_config(&config.push),
    ));
    tokio::spawn(TaskWorker::new(receiver, runner).run());

    let renewer = LeaseRenewer::new(db.clone(), queue.clone(), &config.push);
    tokio::spawn(async move { renewer.run().await });

    let state = Arc::new(AppState::new(db, queue, manager, &config.activity));
    let server = WebServer::new(&config.server, state)?;
    server.run().await?;

    Ok(())
}

// Errors are reported to the operator; the command never fails the process.
async fn import_feed(config: &Config, feed_url: &str, target: &str, limit: Option<usize>) {
    match run_import(config, feed_url, target, limit).await {
        Ok(report) => println!(
            "Imported {} of {} item(s) from {}",
            report.created, report.considered, feed_url
        ),
        Err(e) => eprintln!("{e}"),
    }
}

async fn run_import(
    config: &Config,
    feed_url: &str,
    target: &str,
    limit: Option<usize>,
) -> betafarm::Result<ImportReport> {
    let db = Database::open(&config.database.path).await?;
    let fetcher = Arc::new(HttpFetcher::new(&config.push)?);
    FeedImporter::new(db, fetcher)
        .import(feed_url, &ImportTarget::parse(target), limit)
        .await
}
