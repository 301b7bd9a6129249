use std::path::PathBuf;

use clap::{Parser, Subcommand};
use flexi_logger::Logger;
use log::{debug, info};

use crate::config::Config;
use crate::database::Database;
use crate::error::MigrateError;
use crate::migrator::Migrator;
use crate::orders::{accept_order, backfill_commission, AcceptOutcome};
use crate::schema::base::CREATE_BASE_SCHEMA_SQL;
use crate::schema::MigrationContext;
use crate::settings::{resolve_commission_rate, PlatformSetting};

#[derive(Parser)]
#[command(
    name = "petmigrate",
    version,
    about = "petmigrate: idempotent schema patches and backfills for the pet transport database"
)]
pub struct Cli {
    /// Configuration file (default: config.toml in the user config directory)
    #[arg(long = "config", short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overriding the configured path
    #[arg(long = "db", short = 'd', global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Apply pending migrations (default if no command specified)
    Migrate {
        /// Run every migration again, including ones already recorded
        #[arg(long = "force", default_value_t = false)]
        force: bool,
    },

    /// List migrations and when each was applied
    Status {
        /// Print as JSON
        #[arg(long = "json", default_value_t = false)]
        json: bool,
    },

    /// Create the application's base tables on an empty database
    Init,

    /// Compute platform fee and driver earnings for priced orders that lack them
    #[command(name = "backfill-commission")]
    BackfillCommission,

    /// Mark an order as accepted by a driver
    #[command(name = "accept-order")]
    AcceptOrder {
        /// Order to accept
        #[arg(long = "order", short = 'o')]
        order: i64,

        /// Driver taking the order (default: lowest existing driver id)
        #[arg(long = "driver")]
        driver: Option<i64>,
    },

    /// List platform settings
    Settings,
}

impl Cli {
    pub fn handle_command_line() -> Result<(), MigrateError> {
        let args = Cli::parse();

        let mut config = Config::load(args.config.as_deref())?;
        if let Some(db_path) = args.db {
            config.database.path = db_path;
        }

        // RUST_LOG, when set, wins over the configured level
        let _logger = Logger::try_with_env_or_str(config.logging.log_spec())?.start()?;
        debug!("Command-line args: {:?}", std::env::args_os().collect::<Vec<_>>());
        debug!("Configuration: {:?}", config);

        let mut db = Database::open(&config.database.path)?;
        let ctx = MigrationContext {
            default_rate: config.commission.default_rate(),
        };

        match args.command.unwrap_or(Command::Migrate { force: false }) {
            Command::Migrate { force } => Self::migrate(&mut db, &ctx, force),
            Command::Status { json } => Self::status(&db, json),
            Command::Init => Self::init(&db),
            Command::BackfillCommission => Self::backfill(&mut db, &ctx),
            Command::AcceptOrder { order, driver } => Self::accept(&db, order, driver),
            Command::Settings => Self::settings(&db),
        }
    }

    fn migrate(db: &mut Database, ctx: &MigrationContext, force: bool) -> Result<(), MigrateError> {
        let report = Migrator::apply_all(db, ctx, force)?;

        for outcome in &report.applied {
            println!(
                "Applied {:<28} {} columns added, {} rows affected",
                outcome.name, outcome.columns_added, outcome.rows_affected
            );
        }
        println!(
            "{} applied, {} already applied",
            report.applied.len(),
            report.skipped.len()
        );

        Ok(())
    }

    fn status(db: &Database, json: bool) -> Result<(), MigrateError> {
        let status = Migrator::status(db)?;

        if json {
            println!("{}", serde_json::to_string_pretty(&status)?);
            return Ok(());
        }

        for unit in &status {
            println!(
                "{:<28} {:<9} {:<20} {}",
                unit.name,
                unit.kind,
                unit.applied_at.as_deref().unwrap_or("pending"),
                unit.description
            );
        }

        Ok(())
    }

    fn init(db: &Database) -> Result<(), MigrateError> {
        db.conn().execute_batch(CREATE_BASE_SCHEMA_SQL)?;
        info!("Base schema ensured");
        println!("Base tables ready");

        Ok(())
    }

    fn backfill(db: &mut Database, ctx: &MigrationContext) -> Result<(), MigrateError> {
        let tx = db.transaction()?;
        let rate = resolve_commission_rate(&tx, ctx.default_rate)?;
        let summary = backfill_commission(&tx, rate)?;
        tx.commit()?;

        println!(
            "Updated {} orders: price {} -> platform fee {}, driver earnings {}",
            summary.updated,
            summary.total_price,
            summary.total_platform_fee,
            summary.total_driver_earnings
        );

        Ok(())
    }

    fn accept(db: &Database, order_id: i64, driver_id: Option<i64>) -> Result<(), MigrateError> {
        match accept_order(db.conn(), order_id, driver_id)? {
            AcceptOutcome::Accepted { driver_id } => {
                println!("Order #{} accepted by driver #{}", order_id, driver_id)
            }
            AcceptOutcome::Unchanged { status, driver_id } => println!(
                "Order #{} unchanged (status {}, driver {})",
                order_id,
                status.as_deref().unwrap_or("none"),
                driver_id.map_or_else(|| "none".to_string(), |id| format!("#{}", id))
            ),
            AcceptOutcome::NotFound => {
                return Err(MigrateError::Error(format!("Order #{} not found", order_id)))
            }
        }

        Ok(())
    }

    fn settings(db: &Database) -> Result<(), MigrateError> {
        if !Database::table_exists(db.conn(), "platform_settings")? {
            println!("No platform settings (run 'migrate' first)");
            return Ok(());
        }

        for setting in PlatformSetting::list(db.conn())? {
            println!(
                "{:<24} {:<12} {}",
                setting.key,
                setting.value,
                setting.description.as_deref().unwrap_or("")
            );
        }

        Ok(())
    }
}
