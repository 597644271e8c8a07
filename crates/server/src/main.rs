#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rolerag_server::start().await
}
