#[tokio::main]
async fn main() {
    // Bind/serve failures are already logged by the bootstrap path.
    if snake_session_server::run_with_config().await.is_err() {
        std::process::exit(1);
    }
}
