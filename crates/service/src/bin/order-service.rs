//! Order service entry point.

use service::Role;

#[tokio::main]
async fn main() {
    if let Err(e) = service::start(Role::Order).await {
        tracing::error!(error = %e, "order-service failed");
        std::process::exit(1);
    }
}
