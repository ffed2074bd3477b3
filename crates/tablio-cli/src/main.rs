//! Tablio CLI - Main entry point

use clap::Parser;
use std::process;
use tablio_cli::commands::{export::ExportArgs, import::ImportArgs};
use tablio_cli::{Cli, Commands, Config};
use tablio_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use tracing::error;

#[tokio::main]
async fn main() {
    // A .env file may supply TABLIO_* settings before clap reads them
    let _ = dotenvy::dotenv();

    // Parse command-line arguments
    let cli = Cli::parse();

    // Handle markdown help generation
    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    // Ensure a command is provided
    if cli.command.is_none() {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    }

    // Verbose mode logs debug to the console; otherwise only warnings
    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn })
        .output(LogOutput::Console)
        .log_file_prefix("tablio-cli")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // Initialize logging (ignore errors as CLI should work without logging)
    let _guard = init_logging(&log_config).ok().flatten();

    // Execute command
    match execute_command(cli).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Execute the CLI command. `Ok(false)` means the command ran but the work
/// did not finish (an aborted import).
async fn execute_command(cli: Cli) -> tablio_cli::Result<bool> {
    let config = Config::from_env()?.with_overrides(cli.database, cli.user, cli.verbose)?;

    // Command is guaranteed to exist at this point (checked in main)
    let Some(command) = cli.command else {
        unreachable!("Command should have been validated in main");
    };

    match command {
        Commands::Import {
            table,
            file,
            policy,
            chunk_size,
            header_rows,
            tolerance,
            skip_existing,
            encoding,
            delimiter,
            batch_id,
            output,
        } => {
            let args = ImportArgs {
                table,
                file,
                policy,
                chunk_size,
                header_rows,
                tolerance,
                skip_existing,
                encoding,
                delimiter,
                batch_id,
                output,
            };
            let summary = tablio_cli::commands::import::run(&config, args).await?;
            Ok(!summary.is_aborted())
        }

        Commands::Export {
            table,
            format,
            output,
            policy,
            encoding,
            chunk_size,
        } => {
            let args = ExportArgs {
                table,
                format,
                output,
                policy,
                encoding,
                chunk_size,
            };
            tablio_cli::commands::export::run(&config, args).await?;
            Ok(true)
        }

        Commands::Log {
            batch_id,
            level,
            output,
        } => {
            tablio_cli::commands::log::run(&config, &batch_id, level, output).await?;
            Ok(true)
        }

        Commands::Schema { table, json } => {
            tablio_cli::commands::schema::run(&config, &table, json).await?;
            Ok(true)
        }
    }
}
