// src/main.rs
//
// Entry point for a validator node: loads configuration, generates (or in
// a real deployment, loads) a validator keypair, and runs the node until
// terminated.

use std::sync::Arc;

use chain::{Node, NodeConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "fatal error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = NodeConfig::default();

    // In a real deployment this keypair is loaded from a secure key file
    // rather than generated fresh on every start, since a validator's
    // on-chain identity (and any stake delegated to it) is tied to it.
    let identity = chain::crypto::Keypair::generate();
    tracing::info!(address = %identity.address(), "validator identity");

    let node = Arc::new(Node::new(config, identity)?);
    node.run().await?;
    Ok(())
}
