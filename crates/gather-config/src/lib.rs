//! Configuration for gather, read from an optional global file,
//! `GATHER_CONFIG_*` environment variables, and `gatherrc.toml` files in the
//! project root, in that order. Later sources win.

use std::path::PathBuf;

pub use clap::{parser::ValueSource, ArgMatches};
pub use config::Config as GatherConfig;
use config::{Environment, File};
use directories::ProjectDirs;
use miette::Result;

pub use error::GatherConfigError;
pub use gather_config_derive::*;

mod error;

/// Fills in CLI fields from configuration when they weren't passed on the
/// command line.
pub trait GatherConfigLayer {
    fn layer_config(&mut self, _matches: &ArgMatches, _config: &GatherConfig) -> Result<()> {
        Ok(())
    }
}

pub struct GatherConfigOptions {
    global: bool,
    env: bool,
    root: Option<PathBuf>,
    global_config_file: Option<PathBuf>,
}

impl Default for GatherConfigOptions {
    fn default() -> Self {
        GatherConfigOptions {
            global: true,
            env: true,
            root: None,
            global_config_file: None,
        }
    }
}

impl GatherConfigOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global(mut self, global: bool) -> Self {
        self.global = global;
        self
    }

    pub fn env(mut self, env: bool) -> Self {
        self.env = env;
        self
    }

    /// Directory searched for `gatherrc.toml` and `.gatherrc.toml`.
    pub fn root(mut self, root: Option<PathBuf>) -> Self {
        self.root = root;
        self
    }

    pub fn global_config_file(mut self, file: Option<PathBuf>) -> Self {
        self.global_config_file = file;
        self
    }

    /// The per-user config file, `gatherrc.toml` in the platform's config
    /// directory.
    pub fn default_global_config_file() -> Option<PathBuf> {
        ProjectDirs::from("", "", "gather").map(|d| d.config_dir().join("gatherrc.toml"))
    }

    pub fn load(self) -> Result<GatherConfig> {
        let mut builder = GatherConfig::builder();
        if self.global {
            if let Some(config_file) = self.global_config_file {
                let path = config_file.display().to_string();
                builder = builder.add_source(File::with_name(&path[..]).required(false));
            }
        }
        if self.env {
            builder = builder.add_source(Environment::with_prefix("gather_config"));
        }
        if let Some(root) = self.root {
            for name in ["gatherrc.toml", ".gatherrc.toml"] {
                builder = builder.add_source(
                    File::with_name(&root.join(name).display().to_string()).required(false),
                );
            }
        }
        Ok(builder.build().map_err(GatherConfigError::ConfigError)?)
    }
}
