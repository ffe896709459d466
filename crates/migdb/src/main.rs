//! migdb CLI
//!
//! Command-line tool for migrating groups of databases.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use migdb::config::DEFAULT_ENVIRONMENT;
use migdb::prelude::*;
use migdb::scaffold::{config_path, group_dir};

/// Ordered, versioned schema migrations for groups of databases.
#[derive(Parser)]
#[command(name = "migdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project root containing the `migrators` directory.
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Configuration environment to use.
    #[arg(short, long, env = "MIGDB_ENV", default_value = DEFAULT_ENVIRONMENT)]
    env: String,

    /// Enable verbose output (logs every statement).
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a migrator group.
    Init {
        /// Group name.
        group: String,
    },

    /// Create a new migration file in a group.
    Create {
        /// Group name.
        group: String,
    },

    /// Apply pending migrations.
    Migrate {
        /// Group to migrate (all if not specified).
        group: Option<String>,

        /// Seconds to keep retrying an unreachable node.
        #[arg(short, long, default_value_t = 0)]
        wait: u64,
    },

    /// Roll a group back to just after a version.
    Rollback {
        /// Group name.
        group: String,

        /// Version to keep; everything newer is reverted (all if not specified).
        version: Option<String>,

        /// Seconds to keep retrying an unreachable node.
        #[arg(short, long, default_value_t = 0)]
        wait: u64,
    },

    /// Show migration status.
    Status {
        /// Group to show (all if not specified).
        group: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { ref group } => {
            let path = init_group(&cli.root, group)?;
            info!("Add connection URIs to:\n  {}", path.display());
        }

        Commands::Create { ref group } => {
            let path = create_migration(&cli.root, group, Utc::now())?;
            println!("Created:\n  {}", path.display());
        }

        Commands::Migrate { ref group, wait } => {
            let config = load_config(&cli)?;
            let groups = selected_groups(&config, group.as_deref())?;
            if groups.is_empty() {
                info!("No migrators defined.");
            }
            for name in groups {
                let runner = group_runner(&cli, &config, &name)?.wait(Duration::from_secs(wait));
                runner
                    .apply()
                    .await
                    .with_context(|| format!("Migrating group \"{name}\" failed"))?;
            }
        }

        Commands::Rollback {
            ref group,
            ref version,
            wait,
        } => {
            let config = load_config(&cli)?;
            let runner = group_runner(&cli, &config, group)?.wait(Duration::from_secs(wait));
            runner
                .revert(version.as_deref())
                .await
                .with_context(|| format!("Rolling back group \"{group}\" failed"))?;
        }

        Commands::Status { ref group } => {
            let config = load_config(&cli)?;
            for name in selected_groups(&config, group.as_deref())? {
                let runner = group_runner(&cli, &config, &name)?;
                println!("\n{name}:");
                println!("{:-<60}", "");
                for node in runner.status().await? {
                    println!(" {} ({})", node.alias, node.report.state);
                    for version in &node.report.applied {
                        println!("  [X] {version}");
                    }
                    for version in &node.report.pending {
                        println!("  [ ] {version}");
                    }
                }
            }
            println!();
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let path = config_path(&cli.root);
    if !path.exists() {
        anyhow::bail!(
            "{} could not be located, make sure you have initialized the environment.",
            path.display()
        );
    }
    Ok(Config::load(&path, &cli.env)?)
}

fn selected_groups(config: &Config, group: Option<&str>) -> anyhow::Result<Vec<String>> {
    match group {
        Some(name) => Ok(vec![config.group(name)?.name.clone()]),
        None => Ok(config.groups().iter().map(|g| g.name.clone()).collect()),
    }
}

fn group_runner(
    cli: &Cli,
    config: &Config,
    group: &str,
) -> anyhow::Result<GroupRunner<DirectoryLoader>> {
    let vars = layered_vars(&cli.root, &cli.env, std::env::vars().collect())?;
    let nodes = config.resolve_group(group, &vars)?;
    let migrator = Migrator::new(DirectoryLoader::new(group_dir(&cli.root, group)));
    let mut options = migdb_sql::AcquireOptions::default();
    options.session = options.session.log_statements(cli.verbose);
    Ok(GroupRunner::new(group, nodes, migrator).acquire_options(options))
}
