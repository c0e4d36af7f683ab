#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = speakwise_grading::run_worker().await {
        eprintln!("speakwise-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
