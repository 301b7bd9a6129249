mod cli;
mod commission;
mod config;
mod database;
mod error;
mod migrator;
mod orders;
mod schema;
mod settings;

use cli::Cli;
use log::error;

fn main() {
    // Log level comes from config.toml (logging.level) or PETMIGRATE_LOGGING__LEVEL.
    // RUST_LOG overrides both:
    // ERROR → WARN → INFO → DEBUG → TRACE
    if let Err(err) = Cli::handle_command_line() {
        error!("{:?}", err);
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
