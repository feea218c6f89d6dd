use anyhow::{bail, Context, Result};
use clap::builder::TypedValueParser;
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::debug;
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use layerscope::notifier::VerbosityLevel;
use layerscope::{file_tree_from_reader, DockerRuntime, Inspector, Notifier, RuntimeConfig};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Format {
    Json,
    Markdown,
}

#[derive(Subcommand)]
enum Command {
    /// Print image attributes and layer history
    Metadata {
        #[arg(help = "Image to inspect (e.g., alpine:latest)")]
        image: String,

        #[arg(short, long, value_enum, default_value = "json")]
        format: Format,
    },
    /// Print the image filesystem as a depth-limited JSON tree
    Tree {
        #[arg(
            help = "Image to list (e.g., alpine:latest)",
            required_unless_present = "archive"
        )]
        image: Option<String>,

        #[arg(
            short = 'd',
            long,
            env = "LAYERSCOPE_MAX_DEPTH",
            default_value_t = layerscope::DEFAULT_MAX_DEPTH,
            value_parser = clap::value_parser!(u16).range(1..=64).map(usize::from),
            help = "Entries with more path segments than this are left out"
        )]
        max_depth: usize,

        #[arg(
            long,
            conflicts_with = "image",
            help = "List an exported filesystem tar (plain or gzip) instead of an image"
        )]
        archive: Option<PathBuf>,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(
        long,
        global = true,
        env = "LAYERSCOPE_DOCKER",
        default_value = "docker",
        help = "Container CLI to drive, e.g. \"podman\" or \"sudo docker\""
    )]
    docker_binary: String,

    #[arg(
        long,
        global = true,
        default_value_t = 120,
        help = "Timeout in seconds for runtime commands and export stalls"
    )]
    timeout: u64,

    #[arg(
        long,
        global = true,
        default_value_t = 600,
        help = "Timeout in seconds for pulling a missing image"
    )]
    pull_timeout: u64,

    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Verbose mode (-v for info, -vv for debug, -vvv for trace). Also switches off the spinner"
    )]
    verbose: u8,
}

impl Cli {
    fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            command_timeout: Duration::from_secs(self.timeout),
            idle_timeout: Duration::from_secs(self.timeout),
            pull_timeout: Duration::from_secs(self.pull_timeout),
            ..RuntimeConfig::default()
        }
        .with_command_line(&self.docker_binary)
    }

    fn inspector(&self) -> Result<Inspector<DockerRuntime>> {
        let runtime = DockerRuntime::with_config(self.runtime_config())
            .context("Failed to initialize container runtime")?;
        Ok(Inspector::new(runtime, Notifier::new(self.verbose)))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default())
        .filter_level(VerbosityLevel::from(cli.verbose).to_log_level())
        .init();

    match &cli.command {
        Command::Metadata { image, format } => {
            debug!("Extracting metadata for {}", image);
            let metadata = cli
                .inspector()?
                .extract_metadata(image)
                .with_context(|| format!("Failed to extract metadata for {}", image))?;
            match format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&metadata)?),
                Format::Markdown => print!("{}", metadata.render_markdown()),
            }
        }
        Command::Tree {
            image,
            max_depth,
            archive,
        } => {
            let tree = match (archive, image) {
                (Some(path), _) => {
                    debug!("Listing archive {}", path.display());
                    let file = File::open(path)
                        .with_context(|| format!("Failed to open archive: {}", path.display()))?;
                    file_tree_from_reader(file, *max_depth)
                        .with_context(|| format!("Failed to list {}", path.display()))?
                }
                (None, Some(image)) => cli
                    .inspector()?
                    .extract_file_tree(image, *max_depth)
                    .with_context(|| format!("Failed to list filesystem of {}", image))?,
                (None, None) => bail!("Either an image or --archive is required"),
            };
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
    }

    Ok(())
}
