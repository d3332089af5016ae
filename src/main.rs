#[tokio::main]
async fn main() {
    distribuidores::start_server().await;
}
