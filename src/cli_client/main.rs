use anyhow::{anyhow, Result};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, time::Instant};
use tokio_util::codec::Framed;
use ttlkv::{
    cli_client::cli::Args,
    common::codec::{encode_request, RESP3Codec},
};

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        host,
        port,
        command,
    } = Args::parse();

    let addr = format!("{host}:{port}");

    let tcp = TcpStream::connect(addr).await?;
    let (mut sink, mut stream) = Framed::new(tcp, RESP3Codec).split();

    let request = encode_request(&command.into_request());

    let start = Instant::now();

    sink.send(request).await?;
    let response = stream
        .next()
        .await
        .ok_or_else(|| anyhow!("Connection closed before a response arrived"))??;

    let time = start.elapsed();
    println!("{response} in {time:?}");

    Ok(())
}
