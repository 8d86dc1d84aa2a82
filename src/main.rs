use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vision_airdrop::chain::{Keypair, Ledger, RpcLedger};
use vision_airdrop::holders::{self, CollectOptions, HolderStore, WalletCollector};
use vision_airdrop::storage::DocumentStore;
use vision_airdrop::{
    Address, DistributionExecutor, DistributionLedger, DistributionPolicy, DistributionRequest,
    EngineConfig, HolderRecord, Progress, Simulator,
};

#[derive(Parser, Debug)]
#[command(name = "vision-airdrop", version, about = "Token distribution to asset holders")]
struct Cli {
    /// TOML config file; missing file means defaults
    #[arg(long, global = true, default_value = "airdrop.toml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Collect the holders of an asset and print or export them
    Collect {
        #[command(flatten)]
        holders: HolderArgs,

        /// Write the snapshot to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
    },

    /// Plan a distribution and estimate cost, duration and risk
    Simulate {
        #[command(flatten)]
        request: RequestArgs,

        /// Planning precision; defaults to the configured value
        #[arg(long)]
        decimals: Option<u8>,

        /// Print the report as JSON
        #[arg(long = "json", default_value_t = false)]
        json: bool,
    },

    /// Execute a distribution
    Distribute {
        #[command(flatten)]
        request: RequestArgs,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// List past distribution runs, newest first
    History {
        #[arg(long)]
        limit: Option<usize>,

        /// Show one run with its per-recipient outcomes
        #[arg(long)]
        id: Option<String>,
    },
}

#[derive(Args, Debug)]
struct HolderArgs {
    /// Asset (mint) address
    #[arg(long)]
    asset: Address,

    /// Minimum holder balance, whole tokens
    #[arg(long, default_value_t = 0.0)]
    threshold: f64,

    #[arg(long = "max-holders")]
    max_holders: Option<usize>,

    /// Address to leave out; repeatable
    #[arg(long = "exclude")]
    exclude: Vec<Address>,

    /// Query the ledger even if a cached snapshot is fresh
    #[arg(long = "no-cache", default_value_t = false)]
    no_cache: bool,

    /// Cache TTL in seconds; defaults to the configured value
    #[arg(long)]
    ttl: Option<u64>,
}

#[derive(Args, Debug)]
struct RequestArgs {
    #[command(flatten)]
    holders: HolderArgs,

    /// Total amount to distribute, whole tokens
    #[arg(long)]
    amount: f64,

    #[arg(long, default_value_t = DistributionPolicy::Proportional)]
    policy: DistributionPolicy,

    /// Holders below this balance receive nothing
    #[arg(long = "min-balance", default_value_t = 0.0)]
    min_balance: f64,

    #[arg(long = "batch-size")]
    batch_size: Option<usize>,

    /// Read holders from a CSV or JSON snapshot instead of collecting
    #[arg(long = "holders-file")]
    holders_file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
}

struct Engine {
    config: EngineConfig,
    ledger: Arc<dyn Ledger>,
    store: DocumentStore,
}

impl Engine {
    fn open(config: EngineConfig) -> Result<Self> {
        let ledger: Arc<dyn Ledger> = Arc::new(RpcLedger::new(&config.rpc)?);
        let store = DocumentStore::open(&config.storage.data_dir)?;
        Ok(Self {
            config,
            ledger,
            store,
        })
    }

    fn collector(&self) -> WalletCollector {
        WalletCollector::new(self.ledger.clone(), HolderStore::new(self.store.clone()))
    }

    fn history(&self) -> DistributionLedger {
        DistributionLedger::new(self.store.clone())
    }

    async fn collect(&self, args: &HolderArgs) -> Result<Vec<HolderRecord>> {
        let mut options = CollectOptions::new(args.asset)
            .threshold(args.threshold)
            .exclude(args.exclude.iter().copied())
            .use_cache(!args.no_cache)
            .cache_ttl_seconds(args.ttl.unwrap_or(self.config.cache.ttl_seconds));
        if let Some(max) = args.max_holders {
            options = options.max_holders(max);
        }
        Ok(self.collector().collect(&options).await?)
    }

    async fn request(&self, args: &RequestArgs) -> Result<DistributionRequest> {
        let holders = match &args.holders_file {
            Some(path) => read_snapshot(path)?,
            None => self.collect(&args.holders).await?,
        };
        Ok(
            DistributionRequest::new(args.amount, args.holders.asset, holders)
                .with_policy(args.policy)
                .with_minimum_holder_balance(args.min_balance)
                .with_batch_size(args.batch_size.unwrap_or(self.config.distribution.batch_size)),
        )
    }
}

fn read_snapshot(path: &Path) -> Result<Vec<HolderRecord>> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        holders::holders_from_json(&text)
    } else {
        holders::holders_from_csv(&text)
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

fn print_progress(p: &Progress) {
    println!(
        "[{}/{}] ok={} failed={} {:.2}/s",
        p.completed, p.total, p.successful, p.failed, p.rate
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // init tracing from env VISION_AIRDROP_LOG or RUST_LOG
    let filter = std::env::var("VISION_AIRDROP_LOG")
        .unwrap_or_else(|_| std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let config = EngineConfig::load_from(&cli.config)?.apply_env();

    match cli.cmd {
        Commands::Collect {
            holders: args,
            out,
            format,
        } => {
            let engine = Engine::open(config)?;
            let snapshot = engine.collect(&args).await?;
            let rendered = match format {
                ExportFormat::Csv => holders::holders_to_csv(&snapshot),
                ExportFormat::Json => holders::holders_to_json(&snapshot)?,
            };
            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(holders = snapshot.len(), path = %path.display(), "wrote holder snapshot");
                }
                None => print!("{rendered}"),
            }
        }

        Commands::Simulate {
            request,
            decimals,
            json,
        } => {
            let engine = Engine::open(config)?;
            let mut req = engine.request(&request).await?;
            req.decimals = decimals;
            let report = Simulator::from_config(&engine.config).simulate(&req)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let b = &report.breakdown;
                println!("recipients:     {}", b.count);
                println!("total:          {}", b.total);
                println!("avg/min/max:    {} / {} / {}", b.average, b.min, b.max);
                println!("estimated cost: {} SOL", report.estimated_cost);
                println!("estimated time: {}s", report.estimated_duration_secs);
                for risk in &report.risk_factors {
                    println!("⚠️  {risk}");
                }
            }
        }

        Commands::Distribute { request, yes } => {
            let keypair_path = config
                .keypair_path
                .clone()
                .ok_or_else(|| anyhow!("no keypair configured (set keypair_path or VISION_AIRDROP_KEYPAIR)"))?;
            let signer = Arc::new(Keypair::from_file(&keypair_path)?);

            let engine = Engine::open(config)?;
            let req = engine.request(&request).await?;
            let preview = Simulator::from_config(&engine.config).simulate(&req)?;

            println!(
                "distributing {} of {} to {} recipients from {}",
                req.total_amount,
                req.asset,
                preview.breakdown.count,
                signer.address()
            );
            for risk in &preview.risk_factors {
                println!("⚠️  {risk}");
            }
            if !yes && !confirm("proceed?")? {
                bail!("aborted");
            }

            let executor = DistributionExecutor::new(
                engine.ledger.clone(),
                signer,
                engine.history(),
                &engine.config.distribution,
            );
            let run = executor.execute_with_progress(req, print_progress).await?;
            let summary = run.summary();
            println!(
                "run {}: {} confirmed, {} failed, {} tokens delivered",
                run.id, summary.successful, summary.failed, summary.confirmed_amount
            );
            for recipient in run.failed_recipients() {
                println!("failed: {recipient}");
            }
        }

        Commands::History { limit, id } => {
            let store = DocumentStore::open(&config.storage.data_dir)?;
            let history = DistributionLedger::new(store);

            if let Some(id) = id {
                let run = history
                    .get(&id)?
                    .ok_or_else(|| anyhow!("no distribution run {id}"))?;
                println!("{}", serde_json::to_string_pretty(&run)?);
                return Ok(());
            }

            for run in history.history(limit)? {
                let s = run.summary();
                println!(
                    "{}  {}  {} {} {}  ok={} failed={}",
                    run.created_at.to_rfc3339(),
                    run.id,
                    run.request.policy.as_str(),
                    run.request.total_amount,
                    run.request.asset,
                    s.successful,
                    s.failed
                );
            }
        }
    }

    Ok(())
}
