use super::{command, connection_manager::ConnectionManagerHandle, kv_store::KVStoreHandle};
use crate::common::{codec::RESP3Codec, resp3::RESP3Value};
use anyhow::Result;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
};
use tokio_util::codec::Framed;

/// Serves the requests of one client, one at a time, in arrival order.
pub struct Connection {
    receiver: mpsc::Receiver<ConnectionMessage>,
    stream: Framed<TcpStream, RESP3Codec>,
    addr: SocketAddr,
    kv_store: KVStoreHandle,
    conn_manager: ConnectionManagerHandle,
}

#[derive(Debug)]
pub enum ConnectionMessage {
    Shutdown,
}

impl Connection {
    pub fn new(
        receiver: mpsc::Receiver<ConnectionMessage>,
        stream: Framed<TcpStream, RESP3Codec>,
        addr: SocketAddr,
        kv_store: KVStoreHandle,
        conn_manager: ConnectionManagerHandle,
    ) -> Self {
        Connection {
            receiver,
            stream,
            addr,
            kv_store,
            conn_manager,
        }
    }

    /// Answer one frame. Returns `false` once the connection should close.
    async fn handle_frame(&mut self, frame: RESP3Value) -> bool {
        let response = match command::process(&self.kv_store, frame).await {
            Ok(response) => response,
            Err(err) => {
                log::error!("Failed to execute request from {}: {:?}", self.addr, err);
                RESP3Value::SimpleError("ERR server is shutting down".to_string())
            }
        };

        self.stream
            .send(response)
            .await
            .inspect_err(|err| log::error!("Failed to send response to {}: {:?}", self.addr, err))
            .is_ok()
    }
}

async fn run_connection(mut connection: Connection, on_shutdown_complete: oneshot::Sender<()>) {
    log::info!("Client {} connected", connection.addr);

    loop {
        tokio::select! {
            frame = connection.stream.next() => match frame {
                Some(Ok(frame)) => {
                    if !connection.handle_frame(frame).await {
                        break;
                    }
                }
                Some(Err(err)) => {
                    log::error!("Failed to read from {}: {:?}", connection.addr, err);
                    break;
                }
                None => break,
            },
            msg = connection.receiver.recv() => match msg {
                Some(ConnectionMessage::Shutdown) | None => break,
            },
        }
    }

    connection
        .conn_manager
        .remove_connection(connection.addr)
        .await
        .ok();

    log::info!("Client {} disconnected", connection.addr);
    on_shutdown_complete.send(()).ok();
}

#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    pub addr: SocketAddr,
    sender: mpsc::Sender<ConnectionMessage>,
}

impl ConnectionHandle {
    /// Spawn a task serving `stream` and return a handle to it, along with a oneshot receiver
    /// that is signalled once the connection is closed.
    pub fn new(
        stream: Framed<TcpStream, RESP3Codec>,
        addr: SocketAddr,
        kv_store: KVStoreHandle,
        conn_manager: ConnectionManagerHandle,
    ) -> (Self, oneshot::Receiver<()>) {
        let (sender, receiver) = mpsc::channel(8);
        let (on_shutdown_complete, shutdown_complete) = oneshot::channel();

        let connection = Connection::new(receiver, stream, addr, kv_store, conn_manager);
        tokio::spawn(run_connection(connection, on_shutdown_complete));
        (ConnectionHandle { addr, sender }, shutdown_complete)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender.send(ConnectionMessage::Shutdown).await?;
        Ok(())
    }
}
