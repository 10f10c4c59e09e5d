//! Shipping service entry point.

use service::Role;

#[tokio::main]
async fn main() {
    if let Err(e) = service::start(Role::Shipping).await {
        tracing::error!(error = %e, "shipping-service failed");
        std::process::exit(1);
    }
}
