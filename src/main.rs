#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = coursehub_rust::run().await {
        eprintln!("coursehub-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
