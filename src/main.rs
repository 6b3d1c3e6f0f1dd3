#[tokio::main]
async fn main() {
    vnstock_agent::cli::run().await;
}
