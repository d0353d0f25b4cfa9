use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use ttlkv::server::{cli::Args, clock::SystemClock, server::Server};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    log4rs::init_file(&args.log_config, Default::default())?;

    let tcp_listener = TcpListener::bind(format!("{}:{}", args.host, args.port)).await?;

    let server = Server::with_config(tcp_listener, args.store_config(), Arc::new(SystemClock));

    server.run().await?;

    Ok(())
}
