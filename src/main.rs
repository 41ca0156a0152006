use gather::GatherCli;
use miette::Result;

#[async_std::main]
async fn main() -> Result<()> {
    GatherCli::load().await
}
