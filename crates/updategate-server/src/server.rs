use crate::config::Config;
use crate::relay::{spawn_relays, RelaySettings};
use crate::telemetry::{CONNECTIONS_ACCEPTED, DIAL_ERRORS};
use metrics::counter;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};
use updategate_core::ConnectionId;

/// An accepted client together with its freshly dialed upstream.
#[derive(Debug)]
pub struct ConnectionPair {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub client: TcpStream,
    pub upstream: TcpStream,
}

impl ConnectionPair {
    /// Fire-and-forget: the two relays own the sockets from here on.
    pub fn spawn(self, settings: &RelaySettings) {
        let client = self.client.into_split();
        let upstream = self.upstream.into_split();
        let _ = spawn_relays(self.id, client, upstream, settings);
    }
}

pub struct ProxyServer {
    listener: TcpListener,
    upstream_addr: String,
    settings: RelaySettings,
}

impl ProxyServer {
    pub async fn bind(config: &Config) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&config.server.listen_addr).await?;
        let server = Self {
            listener,
            upstream_addr: config.upstream.addr.clone(),
            settings: RelaySettings::from_config(config),
        };
        info!(
            "updategate listening on {}, upstream {}",
            server.local_addr()?,
            server.upstream_addr
        );
        if !server.settings.inspect_server_traffic {
            info!("inspecting client->server traffic only");
        }
        Ok(server)
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Waits for the next client that could be paired with an upstream.
    /// Accept and dial failures are logged and skipped, so this never ends.
    pub async fn next_pair(&mut self) -> ConnectionPair {
        loop {
            let (client, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!("accept error: {err}");
                    continue;
                }
            };
            counter!(CONNECTIONS_ACCEPTED).increment(1);
            let upstream = match TcpStream::connect(&self.upstream_addr).await {
                Ok(stream) => stream,
                Err(err) => {
                    counter!(DIAL_ERRORS).increment(1);
                    warn!(%peer, upstream = %self.upstream_addr, "upstream dial failed: {err}");
                    continue;
                }
            };
            let _ = client.set_nodelay(true);
            let _ = upstream.set_nodelay(true);
            return ConnectionPair {
                id: ConnectionId::new(),
                peer,
                client,
                upstream,
            };
        }
    }

    pub async fn serve(mut self) {
        loop {
            let pair = self.next_pair().await;
            info!(conn = %pair.id, peer = %pair.peer, "relaying connection");
            pair.spawn(&self.settings);
        }
    }
}
