use std::path::PathBuf;

use async_trait::async_trait;
use clap::Args;
use gather_config::GatherConfigLayer;
use gather_metadata::Metadata;
use miette::{IntoDiagnostic, Result, WrapErr};

use crate::commands::GatherCommand;

#[derive(Debug, Args, GatherConfigLayer)]
/// Rewrite a locator so it refers to exactly the content described by a
/// saved fetch result (the `metadata` object printed by `gather fetch
/// --json`).
pub struct PinCmd {
    /// Locator that was fetched.
    #[arg()]
    #[gather_config(ignore)]
    locator: String,

    /// JSON file holding the fetch metadata.
    #[arg(long)]
    #[gather_config(ignore)]
    metadata: PathBuf,

    #[arg(from_global)]
    #[gather_config(ignore)]
    json: bool,
}

#[async_trait]
impl GatherCommand for PinCmd {
    async fn execute(self) -> Result<()> {
        let raw = async_std::fs::read_to_string(&self.metadata)
            .await
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read {}", self.metadata.display()))?;
        let metadata: Metadata = serde_json::from_str(&raw)
            .into_diagnostic()
            .wrap_err("pin::deserialize")?;
        let pinned = metadata.pinned_url(&self.locator)?;
        if self.json {
            let output = serde_json::to_string_pretty(&serde_json::json!({
                "locator": self.locator,
                "pinned": pinned,
            }))
            .into_diagnostic()
            .wrap_err("pin::serialize")?;
            println!("{output}");
        } else {
            println!("{pinned}");
        }
        Ok(())
    }
}
