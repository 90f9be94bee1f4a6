#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stratus_server::run().await
}
