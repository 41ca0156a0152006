//! `gather` fetches whatever a locator points at (a git repository, an
//! HTTP(S) file, an OCI artifact, or a local path) into a destination, and
//! can pin the locator to the exact content it fetched.

use std::path::PathBuf;

use async_trait::async_trait;
use clap::{ArgMatches, CommandFactory, FromArgMatches as _, Parser, Subcommand};
use gather_config::{GatherConfig, GatherConfigLayer, GatherConfigOptions, ValueSource};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

use commands::classify::ClassifyCmd;
use commands::fetch::FetchCmd;
use commands::pin::PinCmd;
use commands::GatherCommand;

mod commands;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct GatherCli {
    /// Project directory to read `gatherrc.toml` from.
    #[arg(global = true, long = "root")]
    root: Option<PathBuf>,

    /// File to read configuration values from.
    #[arg(global = true, long)]
    config: Option<PathBuf>,

    /// Log output level/directive. Supports plain loglevels (off, error,
    /// warn, info, debug, trace) as well as more advanced directives in the
    /// format `target[span{field=value}]=level`.
    #[arg(global = true, long, default_value = "warn")]
    loglevel: String,

    /// Disable all log output.
    #[arg(global = true, long, short)]
    quiet: bool,

    /// Format output as JSON.
    #[arg(global = true, long)]
    json: bool,

    /// Maximum number of files copied at once.
    #[arg(global = true, long, default_value_t = gather_fetch::DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Timeout for HTTP downloads and registry requests, in seconds.
    #[arg(global = true, long, default_value_t = 15)]
    http_timeout: u64,

    /// Force (`true`) or disable (`false`) TLS for OCI registries. By
    /// default, registries on the local machine are reached over plain HTTP.
    #[arg(global = true, long)]
    tls: Option<bool>,

    #[command(subcommand)]
    subcommand: GatherCmd,
}

impl GatherCli {
    fn setup_logging(&self) -> Result<()> {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(
                EnvFilter::builder()
                    .with_default_directive(if self.quiet {
                        LevelFilter::OFF.into()
                    } else {
                        self.loglevel.parse().into_diagnostic()?
                    })
                    .from_env_lossy(),
            )
            .init();
        Ok(())
    }

    fn load_config(&self) -> Result<GatherConfig> {
        if let Some(file) = &self.config {
            GatherConfigOptions::new()
                .global_config_file(Some(file.clone()))
                .load()
        } else {
            GatherConfigOptions::new()
                .global_config_file(GatherConfigOptions::default_global_config_file())
                .root(self.root.clone())
                .load()
        }
    }

    pub async fn load() -> Result<()> {
        let start = std::time::Instant::now();
        let matches = GatherCli::command().get_matches();
        let mut cli = GatherCli::from_arg_matches(&matches).into_diagnostic()?;
        let cfg = cli.load_config()?;
        cli.layer_config(&matches, &cfg)?;
        cli.setup_logging()?;
        cli.execute().await?;
        tracing::info!("Ran in {}s", start.elapsed().as_millis() as f32 / 1000.0);
        Ok(())
    }
}

#[derive(Debug, Subcommand)]
pub enum GatherCmd {
    /// Fetch a source into a destination.
    Fetch(FetchCmd),

    /// Show what kind of source a locator refers to.
    Classify(ClassifyCmd),

    /// Rewrite a locator so it refers to exactly the content that was
    /// fetched.
    Pin(PinCmd),
}

#[async_trait]
impl GatherCommand for GatherCli {
    async fn execute(self) -> Result<()> {
        tracing::debug!("Running command: {:#?}", self.subcommand);
        match self.subcommand {
            GatherCmd::Fetch(fetch) => fetch.execute().await,
            GatherCmd::Classify(classify) => classify.execute().await,
            GatherCmd::Pin(pin) => pin.execute().await,
        }
    }
}

impl GatherConfigLayer for GatherCli {
    fn layer_config(&mut self, args: &ArgMatches, conf: &GatherConfig) -> Result<()> {
        if args.value_source("loglevel") != Some(ValueSource::CommandLine) {
            if let Ok(loglevel) = conf.get_string("loglevel") {
                self.loglevel = loglevel;
            }
        }
        let sub_args = args.subcommand().map(|(_, sub)| sub).unwrap_or(args);
        match self.subcommand {
            GatherCmd::Fetch(ref mut fetch) => fetch.layer_config(sub_args, conf),
            GatherCmd::Classify(ref mut classify) => classify.layer_config(sub_args, conf),
            GatherCmd::Pin(ref mut pin) => pin.layer_config(sub_args, conf),
        }
    }
}
