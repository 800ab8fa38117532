#[tokio::main]
async fn main() -> anyhow::Result<()> {
    heatmap::start_server().await?;

    Ok(())
}
