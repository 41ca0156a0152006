use async_trait::async_trait;
use miette::Result;

pub mod classify;
pub mod fetch;
pub mod pin;

#[async_trait]
pub trait GatherCommand {
    async fn execute(self) -> Result<()>;
}
