//! Inventory service entry point.

use service::Role;

#[tokio::main]
async fn main() {
    if let Err(e) = service::start(Role::Inventory).await {
        tracing::error!(error = %e, "inventory-service failed");
        std::process::exit(1);
    }
}
