use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use discount_rl::{
    Catalog, Config, DecisionService, http, logging, training::train_and_save,
};

#[derive(Parser, Debug)]
#[command(name = "discount-rl", version, about = "Discount recommendations from a Q-learning agent")]
struct Cli {
    /// More log output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// YAML config file; built-in defaults when omitted
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train on the catalog snapshot and save the value table
    Train(TrainArgs),
    /// Serve discount decisions over HTTP
    Serve(ServeArgs),
    /// Print the discount for one product
    Decide { product_id: String },
    /// Train, then serve
    Run {
        #[command(flatten)]
        train: TrainArgs,
        #[command(flatten)]
        serve: ServeArgs,
    },
}

#[derive(Args, Debug)]
struct TrainArgs {
    #[arg(long)]
    episodes: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    epsilon: Option<f64>,
    #[arg(long)]
    catalog: Option<PathBuf>,
    #[arg(long)]
    model: Option<PathBuf>,
    /// Write per-episode metrics to this CSV
    #[arg(long)]
    metrics: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address, e.g. 127.0.0.1:5000
    #[arg(long)]
    addr: Option<String>,
}

impl TrainArgs {
    fn apply(self, config: &mut Config) {
        if let Some(episodes) = self.episodes {
            config.agent.episodes = episodes;
        }
        if self.seed.is_some() {
            config.agent.seed = self.seed;
        }
        if let Some(epsilon) = self.epsilon {
            config.agent.epsilon = epsilon;
        }
        if let Some(catalog) = self.catalog {
            config.paths.catalog = catalog;
        }
        if let Some(model) = self.model {
            config.paths.model = model;
        }
        if self.metrics.is_some() {
            config.paths.metrics = self.metrics;
        }
    }
}

impl ServeArgs {
    fn apply(self, config: &mut Config) {
        if let Some(addr) = self.addr {
            config.server.addr = addr;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Train(args) => {
            args.apply(&mut config);
            config.validate()?;
            train(&config).await?;
        }
        Commands::Serve(args) => {
            args.apply(&mut config);
            config.validate()?;
            serve(&config).await?;
        }
        Commands::Decide { product_id } => {
            let service = DecisionService::open(&config)?;
            let decision = service.decide(&product_id)?;
            println!("{}", serde_json::to_string(&decision)?);
        }
        Commands::Run { train: t, serve: s } => {
            t.apply(&mut config);
            s.apply(&mut config);
            config.validate()?;
            train(&config).await?;
            serve(&config).await?;
        }
    }
    Ok(())
}

async fn train(config: &Config) -> anyhow::Result<()> {
    let catalog = Catalog::from_csv(&config.paths.catalog, config.data.zero_sales)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current episode");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let job_config = config.clone();
    let outcome =
        tokio::task::spawn_blocking(move || train_and_save(&job_config, &catalog, &cancel))
            .await?;
    watcher.abort();
    let outcome = outcome?;

    if let Some(last) = outcome.report.episodes.last() {
        info!(
            episodes = outcome.report.episodes.len(),
            final_reward = last.total_reward,
            model = %config.paths.model.display(),
            "training completed"
        );
    }
    Ok(())
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let service = DecisionService::open(config)?;
    let state = http::AppState {
        service: Arc::new(service),
        model_path: config.paths.model.clone(),
    };
    http::serve(&config.server.addr, state).await
}
