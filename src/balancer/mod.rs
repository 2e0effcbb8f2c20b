//! Round-Robin Connection Balancer
//!
//! The public listener of the multi-process topology. Each accepted
//! connection is pinned to the next worker port in rotation and proxied at
//! the byte level, both directions streaming.
//!
//! ## Core Mechanisms
//! - **Rotation**: an ordered port list and a cursor advanced modulo N, per
//!   connection, never per byte. The cursor lives on the accept loop alone,
//!   so no lock guards it.
//! - **Streaming**: bytes are copied between the two sockets as they arrive;
//!   memory stays bounded regardless of body size.
//! - **No affinity**: the payload is never inspected, so two requests from
//!   one client may land on two workers. Safe, because workers hold no state.

use std::net::SocketAddr;

use anyhow::{Context, Result, bail};
use tokio::net::{TcpListener, TcpStream};

pub struct LoadBalancer {
    listener: TcpListener,
    ports: Vec<u16>,
}

impl LoadBalancer {
    /// Binds the public port. Failing to bind (typically: already in use) is
    /// a startup-fatal error surfaced to the caller.
    pub async fn bind(port: u16, ports: Vec<u16>) -> Result<Self> {
        if ports.is_empty() {
            bail!("load balancer needs at least one worker port");
        }
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("failed to bind public port {port} (already in use?)"))?;
        Ok(Self { listener, ports })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("listener has no local address")
    }

    /// Accept loop: pick the next worker, advance the cursor, hand the
    /// connection to a proxy task and move on.
    pub async fn run(self) -> Result<()> {
        let mut cursor = 0usize;
        loop {
            let (inbound, peer) = self
                .listener
                .accept()
                .await
                .context("accept failed on the public port")?;
            let target = self.ports[cursor];
            cursor = (cursor + 1) % self.ports.len();
            tracing::debug!("Routing {peer} to worker port {target}");
            tokio::spawn(async move {
                if let Err(err) = proxy(inbound, target).await {
                    tracing::debug!("Proxy to port {target} ended: {err}");
                }
            });
        }
    }
}

/// Streams bytes both ways between the client and the chosen worker until
/// both sides close.
async fn proxy(mut inbound: TcpStream, port: u16) -> Result<()> {
    let mut outbound = TcpStream::connect(("127.0.0.1", port))
        .await
        .with_context(|| format!("worker port {port} refused the connection"))?;
    tokio::io::copy_bidirectional(&mut inbound, &mut outbound)
        .await
        .context("bidirectional copy failed")?;
    Ok(())
}
