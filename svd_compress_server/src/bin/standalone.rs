use svd_compress_server::{ServerConfig, init_tracing, start_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cfg = ServerConfig::from_env();
    let handle = start_server(cfg).await?;
    // Park forever
    handle.await.ok();
    Ok(())
}
