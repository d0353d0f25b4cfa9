use super::{
    clock::Clock,
    config::StoreConfig,
    connection::ConnectionHandle,
    connection_manager::ConnectionManagerHandle,
    kv_store::KVStoreHandle,
};
use crate::common::codec::RESP3Codec;
use anyhow::Result;
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
};
use tokio_util::codec::Framed;

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(15);

/// The server struct is responsible for listening for incoming connections and
/// managing the lifecycle of the KV store and connection manager. It is also an abstraction for
/// enabling testing of the server.
pub struct Server {
    tcp_listener: TcpListener,
    kv_store: KVStoreHandle,
    kv_store_shutdown_complete: oneshot::Receiver<()>,
    conn_manager: ConnectionManagerHandle,
    conn_manager_shutdown_complete: oneshot::Receiver<()>,
}

impl Server {
    /// Create a new server instance whose store uses `config` and reads time from `clock`.
    pub fn with_config(
        tcp_listener: TcpListener,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (kv_store, kv_store_shutdown_complete) = KVStoreHandle::new(config, clock);
        let (conn_manager, conn_manager_shutdown_complete) = ConnectionManagerHandle::new();
        Self {
            tcp_listener,
            kv_store,
            kv_store_shutdown_complete,
            conn_manager,
            conn_manager_shutdown_complete,
        }
    }

    pub fn conn_manager(&self) -> ConnectionManagerHandle {
        self.conn_manager.clone()
    }

    /// Run the server until a SIGINT is received, then shut down gracefully.
    /// A second SIGINT, or a shutdown taking longer than 15 seconds, forces the process to exit.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            print!("\x08\x08"); // Erase ^C

            tokio::spawn(async {
                tokio::select!(
                    _ = tokio::signal::ctrl_c() => {
                        log::info!("Forcing shutdown.");
                    },
                    _ = tokio::time::sleep(SHUTDOWN_GRACE_PERIOD) => {
                        log::error!("Timed out after {:?}. Forcing shutdown.", SHUTDOWN_GRACE_PERIOD);
                    }
                );
                std::process::exit(1);
            });
        })
        .await
    }

    /// Accept connections until `shutdown` completes, then close every connection, stop the KV
    /// store and its expiration sweep, and wait for all of them to finish.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        log::info!("Listening on {}", self.tcp_listener.local_addr()?);

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.tcp_listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        self.add_connection(stream, addr)
                            .await
                            .inspect_err(|err| log::error!("Failed to add client: {:?}", err))?;
                    }
                    Err(err) => log::warn!("Failed to accept connection: {:?}", err),
                },
                _ = &mut shutdown => {
                    break;
                }
            }
        }

        log::info!("Shutting down.");

        if self
            .conn_manager
            .shutdown()
            .await
            .inspect_err(|err| log::error!("Failed to shut down connection manager: {:?}", err))
            .is_ok()
        {
            let _ = self.conn_manager_shutdown_complete.await;
        }

        if self
            .kv_store
            .shutdown()
            .await
            .inspect_err(|err| log::error!("Failed to shut down KV store: {:?}", err))
            .is_ok()
        {
            let _ = self.kv_store_shutdown_complete.await;
        }

        Ok(())
    }

    /// Add a new connection to the server. This function will create a new connection handle and
    /// add it to the connection manager. The connection handle will manage the lifecycle of the
    /// connection.
    pub async fn add_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        let stream = Framed::new(stream, RESP3Codec);
        let kv_store = self.kv_store.clone();
        let conn_manager = self.conn_manager.clone();

        let (connection, connection_shutdown_complete) =
            ConnectionHandle::new(stream, addr, kv_store, conn_manager);

        self.conn_manager
            .add_client(connection, connection_shutdown_complete)
            .await?;

        Ok(())
    }
}
