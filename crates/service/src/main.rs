use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use ulp_ledger::Pool;
use ulp_query::SearchMode;
use ulp_service::{Service, ServiceConfig};

#[derive(Parser)]
#[command(name = "ulpd")]
#[command(about = "Credit-gated search over flat-file record dumps", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file (default: $ULP_CONFIG, then ./ulp.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the corpus; results on stdout, one per line
    Search {
        query: String,

        /// Output shape
        #[arg(long, value_enum, default_value = "pair")]
        mode: ModeFlag,

        /// Charge the search to this account's credit
        #[arg(long)]
        account: Option<i64>,
    },

    /// Show an account's balance (creates the account on first contact)
    Balance {
        account: i64,

        /// Display name recorded at first contact
        #[arg(long, default_value = "")]
        name: String,

        /// Referral code of the account that brought this user in
        #[arg(long)]
        referral: Option<String>,
    },

    /// Add credits to an account (creates it when missing)
    Grant {
        account: i64,
        amount: u32,

        #[arg(long, value_enum, default_value = "bonus")]
        pool: PoolFlag,

        /// Admin account performing the grant
        #[arg(long)]
        actor: i64,
    },

    /// Copy a dump file into the corpus
    Ingest { path: PathBuf },

    /// Corpus and ledger counters as JSON
    Stats,

    /// Show an account's referral code and referral count
    Referral { account: i64 },
}

#[derive(Copy, Clone, ValueEnum)]
enum ModeFlag {
    Pair,
    FullLine,
    IdentifierOnly,
    Login,
    Password,
    Dni,
}

impl ModeFlag {
    const fn as_domain(self) -> SearchMode {
        match self {
            ModeFlag::Pair => SearchMode::Pair,
            ModeFlag::FullLine => SearchMode::FullLine,
            ModeFlag::IdentifierOnly => SearchMode::IdentifierOnly,
            ModeFlag::Login => SearchMode::Login,
            ModeFlag::Password => SearchMode::Password,
            ModeFlag::Dni => SearchMode::Dni,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum PoolFlag {
    Daily,
    Bonus,
}

impl PoolFlag {
    const fn as_domain(self) -> Pool {
        match self {
            PoolFlag::Daily => Pool::Daily,
            PoolFlag::Bonus => Pool::Bonus,
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => ServiceConfig::from_path(path)?,
        None => ServiceConfig::load()?,
    };
    let service = Service::start(config).await?;

    match cli.command {
        Commands::Search {
            query,
            mode,
            account,
        } => {
            let reply = match account {
                Some(id) => {
                    service.get_or_create_account(id, "", None);
                    match service.search_charged(id, &query, mode.as_domain()).await? {
                        Some(reply) => reply,
                        None => {
                            eprintln!("Account {id} has no credits left today");
                            service.sync().await;
                            std::process::exit(1);
                        }
                    }
                }
                None => service.search(&query, mode.as_domain()).await?,
            };
            for result in &reply.results {
                println!("{result}");
            }
            eprintln!("{} result(s) for '{query}'", reply.count);
        }

        Commands::Balance {
            account,
            name,
            referral,
        } => {
            service.get_or_create_account(account, &name, referral.as_deref());
            let balance = service.get_balance(account)?;
            println!(
                "daily: {} | bonus: {} | total: {}",
                balance.daily, balance.bonus, balance.total
            );
        }

        Commands::Grant {
            account,
            amount,
            pool,
            actor,
        } => {
            service.grant(account, amount, pool.as_domain(), actor)?;
            let balance = service.get_balance(account)?;
            println!(
                "Granted {amount} credit(s); account {account} now has {} total",
                balance.total
            );
        }

        Commands::Ingest { path } => {
            let dest = service.ingest_file(&path).await?;
            println!("Ingested {}", dest.display());
        }

        Commands::Stats => {
            let stats = service.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Commands::Referral { account } => {
            service.get_or_create_account(account, "", None);
            let info = service.referral_info(account)?;
            println!("code: {} | referrals: {}", info.referral_code, info.referrals);
        }
    }

    service.sync().await;
    Ok(())
}
