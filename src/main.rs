use clap::{Parser, Subcommand};
use log::{error, info};
use std::str::FromStr;
use std::sync::Arc;

use ibkr_flex_ledger::db;
use ibkr_flex_ledger::events::EventRepository;
use ibkr_flex_ledger::flex::FlexWebClient;
use ibkr_flex_ledger::ingestion::{
    IngestionRunRepository, IngestionService, ReprocessScope, ReprocessService, RunType,
};
use ibkr_flex_ledger::instruments::InstrumentRepository;
use ibkr_flex_ledger::ledger::{LedgerRepository, SnapshotService};
use ibkr_flex_ledger::settings::load_settings;
use ibkr_flex_ledger::statements::StatementRepository;
use ibkr_flex_ledger::valuation::ValuationService;

#[derive(Parser)]
#[command(name = "flex-ledger", about = "IBKR Flex statement ingestion and FIFO ledger")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Trigger one ingestion run against the Flex Web Service
    Ingest {
        /// Run trigger source: manual or scheduled
        #[arg(long, default_value = "manual")]
        run_type: String,
    },
    /// Replay canonical mapping and snapshots from the raw store
    Reprocess {
        /// Statement period to replay; omit for a full replay
        #[arg(long)]
        period_key: Option<String>,
        /// Flex query id scoping the replay
        #[arg(long)]
        flex_query_id: Option<String>,
    },
    /// Apply pending database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    if let Err(e) = run().await {
        error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = load_settings()?;

    let pool = db::create_pool(&settings.database_url)?;
    db::run_migrations(&pool)?;

    if let Command::Migrate = cli.command {
        info!("Migrations applied");
        return Ok(());
    }

    let runs = Arc::new(IngestionRunRepository::new(pool.clone()));
    let statements = Arc::new(StatementRepository::new(pool.clone()));
    let instruments = Arc::new(InstrumentRepository::new(pool.clone()));
    let events = Arc::new(EventRepository::new(pool.clone()));
    let ledger = Arc::new(LedgerRepository::new(pool.clone()));
    let valuation = Arc::new(ValuationService::new(statements.clone(), events.clone()));
    let snapshots = Arc::new(SnapshotService::new(
        events.clone(),
        instruments.clone(),
        valuation,
        ledger,
    ));

    let run = match cli.command {
        Command::Ingest { run_type } => {
            let run_type = RunType::from_str(&run_type)
                .map_err(|e| format!("invalid --run-type: {}", e))?;
            let flex = Arc::new(FlexWebClient::new(
                settings.flex_token.clone(),
                settings.flex_base_url.clone(),
                settings.retry.clone(),
            )?);
            let service = IngestionService::new(
                &settings,
                flex,
                runs,
                statements,
                instruments,
                events,
                snapshots,
            );
            service.trigger_ingestion(run_type).await?
        }
        Command::Reprocess {
            period_key,
            flex_query_id,
        } => {
            let service = ReprocessService::new(
                &settings,
                runs,
                statements,
                instruments,
                events,
                snapshots,
            );
            service
                .trigger_reprocess(ReprocessScope {
                    period_key,
                    flex_query_id,
                })
                .await?
        }
        Command::Migrate => unreachable!(),
    };

    println!("run {} finished with status {}", run.id, run.status);
    if let (Some(code), Some(message)) = (&run.error_code, &run.error_message) {
        println!("error {}: {}", code, message);
        std::process::exit(2);
    }
    Ok(())
}
