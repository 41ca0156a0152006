use async_trait::async_trait;
use clap::Args;
use gather_config::GatherConfigLayer;
use gather_locator::{Classifier, UriKind};
use miette::{IntoDiagnostic, Result, WrapErr};

use crate::commands::GatherCommand;

#[derive(Debug, Args, GatherConfigLayer)]
/// Show what kind of source a locator refers to. Git locators are also
/// broken down into what `git clone` will be asked for.
pub struct ClassifyCmd {
    /// Locator to classify.
    #[arg()]
    #[gather_config(ignore)]
    locator: String,

    #[arg(from_global)]
    #[gather_config(ignore)]
    json: bool,
}

#[async_trait]
impl GatherCommand for ClassifyCmd {
    async fn execute(self) -> Result<()> {
        let classifier = Classifier::default();
        let kind = classifier.classify(&self.locator)?;
        let git = if kind == UriKind::Git {
            Some(classifier.process_git_url(&self.locator)?)
        } else {
            None
        };

        if self.json {
            let mut output = serde_json::json!({
                "locator": self.locator,
                "kind": kind.to_string(),
            });
            if let Some(git) = &git {
                output["git"] = serde_json::json!({
                    "clone_url": git.clone_url,
                    "ref": git.git_ref,
                    "subdirectory": git.subdirectory,
                    "depth": git.depth,
                });
            }
            let output = serde_json::to_string_pretty(&output)
                .into_diagnostic()
                .wrap_err("classify::serialize")?;
            println!("{output}");
        } else {
            println!("{kind}");
            if let Some(git) = git {
                println!("  clone url: {}", git.clone_url);
                if !git.git_ref.is_empty() {
                    println!("  ref: {}", git.git_ref);
                }
                if !git.subdirectory.is_empty() {
                    println!("  subdirectory: {}", git.subdirectory);
                }
                if !git.depth.is_empty() {
                    println!("  depth: {}", git.depth);
                }
            }
        }
        Ok(())
    }
}
