use queue_worker_cli::run_cli;

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        // Logging may not be initialized when this fails
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
