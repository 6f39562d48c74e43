use crate::config::Config;
use crate::telemetry::{FRAMES_INSPECTED, STATEMENTS_BLOCKED};
use bytes::Bytes;
use metrics::counter;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use updategate_core::{ConnectionId, Direction, Verdict};
use updategate_protocol::frontend::read_frame;
use updategate_sql::{classify, rejection};

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub copy_buffer_bytes: usize,
    pub inspect_server_traffic: bool,
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            copy_buffer_bytes: config.relay.copy_buffer_bytes,
            inspect_server_traffic: config.policy.inspect_server_traffic,
        }
    }

    pub fn inspects(&self, direction: Direction) -> bool {
        match direction {
            Direction::ClientToServer => true,
            Direction::ServerToClient => self.inspect_server_traffic,
        }
    }
}

/// Sent to the paired relay when one direction ends.
#[derive(Debug)]
pub enum Teardown {
    Close,
    /// ERR frame to deliver to the peer that issued the blocked statement.
    Reject(Bytes),
}

/// The only thing the two relays of a pair share besides their sockets.
#[derive(Debug)]
pub struct PeerLink {
    tx: Option<oneshot::Sender<Teardown>>,
    rx: oneshot::Receiver<Teardown>,
}

impl PeerLink {
    pub fn pair() -> (PeerLink, PeerLink) {
        let (a_tx, a_rx) = oneshot::channel();
        let (b_tx, b_rx) = oneshot::channel();
        (
            PeerLink { tx: Some(a_tx), rx: b_rx },
            PeerLink { tx: Some(b_tx), rx: a_rx },
        )
    }

    fn notify(&mut self, msg: Teardown) {
        if let Some(tx) = self.tx.take() {
            // the peer may already be gone
            let _ = tx.send(msg);
        }
    }
}

#[derive(Debug)]
pub enum RelayExit {
    Eof,
    ReadFailed(anyhow::Error),
    WriteFailed(anyhow::Error),
    /// This direction carried a blocked statement.
    Blocked,
    /// The peer direction blocked and this relay delivered its ERR frame.
    RejectDelivered,
    PeerClosed,
}

#[derive(Debug)]
pub struct Relay {
    conn: ConnectionId,
    direction: Direction,
    inspect: bool,
    copy_buffer_bytes: usize,
}

impl Relay {
    pub fn new(conn: ConnectionId, direction: Direction, settings: &RelaySettings) -> Self {
        Self {
            conn,
            direction,
            inspect: settings.inspects(direction),
            copy_buffer_bytes: settings.copy_buffer_bytes.max(1),
        }
    }

    /// Runs until either socket ends, a statement is blocked, or the peer
    /// relay tears down. Both halves are shut down on return.
    pub async fn run<R, W>(self, mut reader: R, mut writer: W, mut link: PeerLink) -> RelayExit
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let exit = if self.inspect {
            self.inspect_frames(&mut reader, &mut writer, &mut link).await
        } else {
            self.copy_bytes(&mut reader, &mut writer, &mut link).await
        };

        match &exit {
            RelayExit::Blocked => link.notify(Teardown::Reject(rejection().encode().freeze())),
            _ => link.notify(Teardown::Close),
        }
        let _ = writer.shutdown().await;

        match &exit {
            RelayExit::ReadFailed(err) | RelayExit::WriteFailed(err) => {
                warn!(conn = %self.conn, direction = %self.direction, error = %err, "relay failed");
            }
            other => {
                debug!(conn = %self.conn, direction = %self.direction, exit = ?other, "relay finished");
            }
        }
        exit
    }

    async fn inspect_frames<R, W>(&self, reader: &mut R, writer: &mut W, link: &mut PeerLink) -> RelayExit
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        // set while a max-length payload spills into the next packet
        let mut continued = false;
        loop {
            let read = tokio::select! {
                biased;
                signal = &mut link.rx => return self.on_peer_signal(signal, writer).await,
                read = read_frame(reader) => read,
            };
            let frame = match read {
                Ok(Some(frame)) => frame,
                Ok(None) => return RelayExit::Eof,
                Err(err) => return RelayExit::ReadFailed(err),
            };

            let verdict = if continued {
                Verdict::Allowed
            } else {
                counter!(FRAMES_INSPECTED).increment(1);
                classify(&frame.bytes)
            };
            continued = frame.header.is_continued();

            if verdict.is_blocked() {
                counter!(STATEMENTS_BLOCKED).increment(1);
                warn!(
                    target: "audit",
                    conn = %self.conn,
                    direction = %self.direction,
                    statement = %String::from_utf8_lossy(&frame.payload()[1..]),
                    "blocked UPDATE statement"
                );
                return RelayExit::Blocked;
            }
            if let Err(err) = forward(writer, &frame.bytes).await {
                return RelayExit::WriteFailed(err);
            }
        }
    }

    async fn copy_bytes<R, W>(&self, reader: &mut R, writer: &mut W, link: &mut PeerLink) -> RelayExit
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; self.copy_buffer_bytes];
        loop {
            let read = tokio::select! {
                biased;
                signal = &mut link.rx => return self.on_peer_signal(signal, writer).await,
                read = reader.read(&mut buf) => read,
            };
            match read {
                Ok(0) => return RelayExit::Eof,
                Ok(n) => {
                    if let Err(err) = forward(writer, &buf[..n]).await {
                        return RelayExit::WriteFailed(err);
                    }
                }
                Err(err) => return RelayExit::ReadFailed(err.into()),
            }
        }
    }

    async fn on_peer_signal<W>(
        &self,
        signal: Result<Teardown, oneshot::error::RecvError>,
        writer: &mut W,
    ) -> RelayExit
    where
        W: AsyncWrite + Unpin,
    {
        match signal {
            Ok(Teardown::Reject(packet)) => {
                debug!(
                    conn = %self.conn,
                    direction = %self.direction,
                    blocked = %self.direction.reverse(),
                    "delivering rejection"
                );
                match forward(writer, &packet).await {
                    Ok(()) => RelayExit::RejectDelivered,
                    Err(err) => RelayExit::WriteFailed(err),
                }
            }
            Ok(Teardown::Close) | Err(_) => RelayExit::PeerClosed,
        }
    }
}

async fn forward<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> anyhow::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Starts both directions of one connection pair as independent tasks.
pub fn spawn_relays<CR, CW, UR, UW>(
    conn: ConnectionId,
    client: (CR, CW),
    upstream: (UR, UW),
    settings: &RelaySettings,
) -> (JoinHandle<RelayExit>, JoinHandle<RelayExit>)
where
    CR: AsyncRead + Unpin + Send + 'static,
    CW: AsyncWrite + Unpin + Send + 'static,
    UR: AsyncRead + Unpin + Send + 'static,
    UW: AsyncWrite + Unpin + Send + 'static,
{
    let (client_rd, client_wr) = client;
    let (upstream_rd, upstream_wr) = upstream;
    let (to_server_link, to_client_link) = PeerLink::pair();

    let to_server = Relay::new(conn, Direction::ClientToServer, settings);
    let to_client = Relay::new(conn, Direction::ServerToClient, settings);
    (
        tokio::spawn(to_server.run(client_rd, upstream_wr, to_server_link)),
        tokio::spawn(to_client.run(upstream_rd, client_wr, to_client_link)),
    )
}
