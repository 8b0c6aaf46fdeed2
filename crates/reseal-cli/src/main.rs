#[tokio::main]
async fn main() {
    std::process::exit(reseal_cli::run().await);
}
