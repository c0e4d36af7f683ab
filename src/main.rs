#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = speakwise_grading::run().await {
        eprintln!("speakwise-grading fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
