use anyhow::Result;
use apib_mock::app::serve;

#[tokio::main]
async fn main() -> Result<()> {
    serve().await
}
