mod cmd;
mod output;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pkgrepo_lib::types::{PackageId, RepoId};

use crate::cmd::CmdContext;
use crate::output::{OutputFormat, print_error};

/// pkgrepo - package repository build orchestrator
#[derive(Parser)]
#[command(name = "pkgrepo")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// User to run mutating commands as
  #[arg(long, global = true, env = "PKGREPO_USER")]
  user: Option<String>,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Manage repos
  #[command(subcommand)]
  Repo(RepoCommand),

  /// Manage packages
  #[command(subcommand)]
  Package(PackageCommand),

  /// Build a package and stream its log
  Build {
    /// Package id
    id: u64,
  },

  /// Print the latest build log of a package
  Logs {
    /// Package id
    id: u64,
  },
}

#[derive(Subcommand)]
enum RepoCommand {
  /// Create a repo
  Create {
    /// Repo name (letters, digits, '-', '_', '.')
    name: String,
  },

  /// List all repos
  List,
}

#[derive(Subcommand)]
enum PackageCommand {
  /// Register a package in a repo
  Add {
    name: String,

    /// Repo id
    #[arg(long)]
    repo: u64,
  },

  /// List packages, optionally of one repo
  List {
    /// Repo id
    #[arg(long)]
    repo: Option<u64>,
  },

  /// Show a package
  Info {
    /// Package id
    id: u64,
  },

  /// Replace the dependencies of a package
  Depend {
    /// Package id
    id: u64,

    /// Dependency package ids (none clears the set)
    deps: Vec<u64>,
  },

  /// Move a package to another repo
  Move {
    /// Package id
    id: u64,

    /// Target repo id
    #[arg(long)]
    repo: u64,
  },
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::FAILURE
    }
  }
}

async fn run(cli: Cli) -> Result<()> {
  let ctx = CmdContext::new(cli.user, cli.output, cli.verbose);

  match cli.command {
    Commands::Repo(RepoCommand::Create { name }) => cmd::cmd_repo_create(&ctx, &name),
    Commands::Repo(RepoCommand::List) => cmd::cmd_repo_list(&ctx),
    Commands::Package(PackageCommand::Add { name, repo }) => cmd::cmd_package_add(&ctx, &name, RepoId(repo)),
    Commands::Package(PackageCommand::List { repo }) => cmd::cmd_package_list(&ctx, repo.map(RepoId)),
    Commands::Package(PackageCommand::Info { id }) => cmd::cmd_package_info(&ctx, PackageId(id)),
    Commands::Package(PackageCommand::Depend { id, deps }) => {
      cmd::cmd_package_depend(&ctx, PackageId(id), deps.into_iter().map(PackageId).collect())
    }
    Commands::Package(PackageCommand::Move { id, repo }) => cmd::cmd_package_move(&ctx, PackageId(id), RepoId(repo)),
    Commands::Build { id } => cmd::cmd_build(&ctx, PackageId(id)).await,
    Commands::Logs { id } => cmd::cmd_logs(&ctx, PackageId(id)).await,
  }
}
