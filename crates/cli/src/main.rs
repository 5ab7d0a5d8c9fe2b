mod cmd;
mod output;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kiln_lib::consts::DEFAULT_BUILD_FILE;
use kiln_lib::request::BuildType;

use crate::output::OutputFormat;

/// Declarative native build driver
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log verbosity (-v info, -vv debug)
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

/// Where the project and its outputs live.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
  /// Project declaration file
  #[arg(long, default_value = DEFAULT_BUILD_FILE)]
  pub project: PathBuf,

  /// Output root (default: <project dir>/build)
  #[arg(long)]
  pub output_root: Option<PathBuf>,

  /// Build type (Debug or Release)
  #[arg(long, default_value = "Debug")]
  pub build_type: BuildType,
}

#[derive(Subcommand)]
enum Commands {
  /// Build every target of the project
  Build(cmd::BuildArgs),

  /// Remove the outputs of one build type
  Clean {
    #[command(flatten)]
    project: ProjectArgs,
  },

  /// Print the evaluated targets in dependency order
  Graph {
    #[command(flatten)]
    project: ProjectArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
  },
}

fn init_logging(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  let result = match cli.command {
    Commands::Build(args) => cmd::cmd_build(&args),
    Commands::Clean { project } => cmd::cmd_clean(&project).map(|()| true),
    Commands::Graph { project, output } => cmd::cmd_graph(&project, output).map(|()| true),
  };

  match result {
    Ok(true) => {}
    // the summary has already been printed
    Ok(false) => std::process::exit(1),
    Err(err) => {
      output::print_error(&format!("{:#}", err));
      std::process::exit(1);
    }
  }
}
