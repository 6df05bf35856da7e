//! permsync: runtime permission workflow demo

mod app;
mod cli;
mod config;
mod tracing_support;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Command};
use config::DemoConfig;
use permsync_host::session::SessionStateStore;
use tracing_support::{init_subscriber_with_config, TracingConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_subscriber_with_config(TracingConfig {
        level: cli.verbose.then_some(tracing::Level::DEBUG),
        format: cli.log_format,
        ..Default::default()
    });

    let config = DemoConfig::load(cli.config.as_deref())?;

    match cli.resolved_command() {
        Command::Run(args) => {
            app::run(
                config,
                &args,
                cli.state_file.as_deref(),
                cli.audit_log.as_deref(),
            )
            .await?
        }
        Command::Status => {
            let state = app::open_state_store(cli.state_file.as_deref(), &config.app_name)?;
            println!("{}", app::status(&state, &config.app_name)?);
        }
        Command::Reset => {
            let state = app::open_state_store(cli.state_file.as_deref(), &config.app_name)?;
            state.clear(&config.app_name)?;
            println!("{}: saved session cleared", config.app_name);
        }
    }
    Ok(())
}
