use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use clap::Args;
use gather_config::GatherConfigLayer;
use gather_fetch::{CancellationToken, GatherOpts};
use miette::{IntoDiagnostic, Result, WrapErr};

use crate::commands::GatherCommand;

#[derive(Debug, Args, GatherConfigLayer)]
/// Fetch a source into a destination.
#[clap(visible_aliases(["get"]))]
pub struct FetchCmd {
    /// What to fetch: a git repository, HTTP(S) URL, OCI reference or local
    /// path. Prefix with `git::`, `http::`, `oci::` or `file::` to skip
    /// detection.
    #[arg()]
    #[gather_config(ignore)]
    source: String,

    /// Where to put it.
    #[arg()]
    #[gather_config(ignore)]
    destination: PathBuf,

    /// Also print the source pinned to the fetched content.
    #[arg(long)]
    #[gather_config(ignore)]
    pin: bool,

    #[arg(from_global)]
    concurrency: usize,

    #[arg(from_global)]
    http_timeout: u64,

    #[arg(from_global)]
    tls: Option<bool>,

    #[arg(from_global)]
    #[gather_config(ignore)]
    json: bool,
}

#[async_trait]
impl GatherCommand for FetchCmd {
    async fn execute(self) -> Result<()> {
        let start = Instant::now();
        let mut opts = GatherOpts::new()
            .concurrency(self.concurrency)
            .http_timeout(Duration::from_secs(self.http_timeout));
        if let Some(tls) = self.tls {
            opts = opts.tls(tls);
        }
        let gather = opts.build()?;

        let metadata = gather
            .gather_locator(&CancellationToken::new(), &self.source, &self.destination)
            .await?;
        let pinned = if self.pin {
            Some(metadata.pinned_url(&self.source)?)
        } else {
            None
        };
        tracing::info!(
            "fetched {} in {}s",
            self.source,
            start.elapsed().as_millis() as f32 / 1000.0
        );

        if self.json {
            let output = serde_json::to_string_pretty(&serde_json::json!({
                "source": self.source,
                "destination": self.destination,
                "metadata": metadata,
                "pinned": pinned,
            }))
            .into_diagnostic()
            .wrap_err("fetch::serialize")?;
            println!("{output}");
        } else {
            let mut fields: Vec<_> = metadata.get().into_iter().collect();
            fields.sort_by(|(a, _), (b, _)| a.cmp(b));
            println!("fetched {} -> {}", self.source, self.destination.display());
            for (key, value) in fields {
                match value {
                    serde_json::Value::String(s) => println!("  {key}: {s}"),
                    other => println!("  {key}: {other}"),
                }
            }
            if let Some(pinned) = pinned {
                println!("{pinned}");
            }
        }
        Ok(())
    }
}
