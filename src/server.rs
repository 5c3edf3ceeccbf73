//! TCP listener for the text command protocol
//!
//! Each connection gets its own [`FrameConsumer`]. Direct replies go back to
//! the requesting client only; broadcast notifications are forwarded to every
//! connected client.

use crate::broadcast::Broadcaster;
use crate::protocol::{FrameConsumer, ProtocolDispatcher};
use crate::station::Station;
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

pub struct ProtocolServer {
    listener: TcpListener,
    dispatcher: Arc<ProtocolDispatcher>,
    broadcaster: Broadcaster,
}

impl ProtocolServer {
    pub async fn bind(
        addr: &str,
        dispatcher: Arc<ProtocolDispatcher>,
        broadcaster: Broadcaster,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind protocol listener on {}", addr))?;
        Ok(Self {
            listener,
            dispatcher,
            broadcaster,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!("Protocol server listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            info!("Protocol client connected: {}", peer);
                            let dispatcher = self.dispatcher.clone();
                            let notifications = self.broadcaster.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_client(stream, dispatcher, notifications).await {
                                    debug!("Protocol client {} error: {}", peer, e);
                                }
                                info!("Protocol client disconnected: {}", peer);
                            });
                        }
                        Err(e) => error!("Failed to accept protocol client: {}", e),
                    }
                }
                _ = &mut shutdown => {
                    info!("Protocol server stopped");
                    return Ok(());
                }
            }
        }
    }
}

/// Serve the station's protocol on `addr` until `shutdown` resolves
pub async fn run(station: &Station, addr: &str, shutdown: impl Future<Output = ()>) -> Result<()> {
    let server = ProtocolServer::bind(
        addr,
        Arc::new(station.dispatcher()),
        station.broadcaster.clone(),
    )
    .await?;
    server.run(shutdown).await
}

async fn handle_client(
    stream: TcpStream,
    dispatcher: Arc<ProtocolDispatcher>,
    broadcaster: Broadcaster,
) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let mut consumer = FrameConsumer::new(dispatcher);
    let mut notifications = broadcaster.subscribe();
    let mut buf = [0u8; 512];

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Ok(());
                }
                let reply = consumer.feed(&buf[..n]).await;
                if !reply.is_empty() {
                    writer.write_all(reply.as_bytes()).await?;
                }
            }
            notification = notifications.recv() => {
                match notification {
                    Ok(line) => writer.write_all(line.as_bytes()).await?,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Protocol client lagging, {} notification(s) dropped", skipped);
                    }
                    Err(RecvError::Closed) => return Ok(()),
                }
            }
        }
    }
}
