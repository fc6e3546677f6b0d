#[tokio::main]
async fn main() -> anyhow::Result<()> {
    caldate_server::start_server().await
}
