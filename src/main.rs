//! Artbook Backend - binary entry point
//! Delegates to the library for all app logic.

#[tokio::main]
async fn main() {
    artbook_backend::run().await;
}
