use super::connection::ConnectionHandle;
use anyhow::Result;
use futures::future;
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};

/// Keeps track of open client connections so they can all be closed on shutdown.
pub struct ConnectionManager {
    receiver: mpsc::Receiver<ConnectionManagerMessage>,
    clients: Vec<(ConnectionHandle, oneshot::Receiver<()>)>,
}

#[derive(Debug)]
pub enum ConnectionManagerMessage {
    AddClient {
        connection: ConnectionHandle,
        connection_shutdown_complete: oneshot::Receiver<()>,
    },
    RemoveConnection {
        addr: SocketAddr,
    },
    ClientCount {
        respond_to: oneshot::Sender<usize>,
    },
    Shutdown,
}

impl ConnectionManager {
    pub fn new(receiver: mpsc::Receiver<ConnectionManagerMessage>) -> Self {
        ConnectionManager {
            receiver,
            clients: Vec::new(),
        }
    }

    pub async fn handle_message(&mut self, msg: ConnectionManagerMessage) {
        match msg {
            ConnectionManagerMessage::AddClient {
                connection,
                connection_shutdown_complete,
            } => {
                self.clients
                    .push((connection, connection_shutdown_complete));
            }
            ConnectionManagerMessage::RemoveConnection { addr } => {
                if let Some(index) = self.clients.iter().position(|(c, _)| c.addr == addr) {
                    self.clients.remove(index);
                }
            }
            ConnectionManagerMessage::ClientCount { respond_to } => {
                respond_to.send(self.clients.len()).ok();
            }
            ConnectionManagerMessage::Shutdown => {
                future::join_all(self.clients.iter().map(|(client, _)| client.shutdown())).await;

                self.receiver.close();
            }
        }
    }
}

async fn run_connection_manager(
    mut connection_manager: ConnectionManager,
    on_shutdown_complete: oneshot::Sender<()>,
) {
    log::info!("Connection manager started");

    while let Some(msg) = connection_manager.receiver.recv().await {
        connection_manager.handle_message(msg).await;
    }

    let connection_shutdown_channels = connection_manager
        .clients
        .into_iter()
        .map(|(_, s)| s)
        .collect::<Vec<_>>();

    let _ = future::join_all(connection_shutdown_channels).await;

    log::info!("Connection manager shut down");
    on_shutdown_complete.send(()).ok();
}

#[derive(Clone, Debug)]
pub struct ConnectionManagerHandle {
    sender: mpsc::Sender<ConnectionManagerMessage>,
}

impl ConnectionManagerHandle {
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (sender, receiver) = mpsc::channel(32);
        let (on_shutdown_complete, shutdown_complete) = oneshot::channel();

        let connection_manager = ConnectionManager::new(receiver);
        tokio::spawn(run_connection_manager(
            connection_manager,
            on_shutdown_complete,
        ));
        (ConnectionManagerHandle { sender }, shutdown_complete)
    }

    pub async fn add_client(
        &self,
        connection: ConnectionHandle,
        connection_shutdown_complete: oneshot::Receiver<()>,
    ) -> Result<()> {
        let msg = ConnectionManagerMessage::AddClient {
            connection,
            connection_shutdown_complete,
        };
        self.sender.send(msg).await?;
        Ok(())
    }

    pub async fn remove_connection(&self, addr: SocketAddr) -> Result<()> {
        let msg = ConnectionManagerMessage::RemoveConnection { addr };
        self.sender.send(msg).await?;
        Ok(())
    }

    /// Number of connections currently being served.
    pub async fn client_count(&self) -> Result<usize> {
        let (respond_to, response) = oneshot::channel();
        let msg = ConnectionManagerMessage::ClientCount { respond_to };
        self.sender.send(msg).await?;
        response.await.map_err(Into::into)
    }

    pub async fn shutdown(&self) -> Result<()> {
        let msg = ConnectionManagerMessage::Shutdown;
        self.sender.send(msg).await?;
        Ok(())
    }
}
