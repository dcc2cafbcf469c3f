use loader::runtime::{boot, run};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    boot::init_logging();
    let (config, sink) = boot::boot().await?;
    run::run(config, sink).await
}
