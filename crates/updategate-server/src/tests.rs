#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::relay::{spawn_relays, RelayExit, RelaySettings};
    use crate::server::ProxyServer;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use updategate_core::ConnectionId;
    use updategate_protocol::backend::decode_err_packet;
    use updategate_protocol::messages::{COM_QUERY, COM_STMT_PREPARE, HEADER_LEN, MAX_PAYLOAD_LEN};
    use updategate_sql::{rejection, UPDATE_REJECTED_CODE, UPDATE_REJECTED_MESSAGE};

    const OK_PACKET: [u8; 11] = [0x07, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];

    fn command(code: u8, sql: &str) -> Vec<u8> {
        let payload_len = (sql.len() + 1) as u32;
        let mut buf = payload_len.to_le_bytes()[..3].to_vec();
        buf.push(0);
        buf.push(code);
        buf.extend_from_slice(sql.as_bytes());
        buf
    }

    fn settings(inspect_server_traffic: bool) -> RelaySettings {
        RelaySettings {
            copy_buffer_bytes: 4096,
            inspect_server_traffic,
        }
    }

    struct Harness {
        client: DuplexStream,
        upstream: DuplexStream,
        to_server: JoinHandle<RelayExit>,
        to_client: JoinHandle<RelayExit>,
    }

    fn start(settings: RelaySettings) -> Harness {
        let (client, client_proxy) = tokio::io::duplex(64 * 1024);
        let (upstream_proxy, upstream) = tokio::io::duplex(64 * 1024);
        let (to_server, to_client) = spawn_relays(
            ConnectionId::new(),
            tokio::io::split(client_proxy),
            tokio::io::split(upstream_proxy),
            &settings,
        );
        Harness {
            client,
            upstream,
            to_server,
            to_client,
        }
    }

    async fn read_all<S: tokio::io::AsyncRead + Unpin>(stream: &mut S) -> Vec<u8> {
        let mut buf = Vec::new();
        timeout(Duration::from_secs(30), stream.read_to_end(&mut buf))
            .await
            .expect("stream did not close")
            .expect("read");
        buf
    }

    #[tokio::test]
    async fn select_and_reply_pass_through_unchanged() {
        let mut h = start(settings(false));
        let query = command(COM_QUERY, "SELECT * FROM t");
        h.client.write_all(&query).await.expect("write");

        let mut forwarded = vec![0u8; query.len()];
        h.upstream.read_exact(&mut forwarded).await.expect("read");
        assert_eq!(forwarded, query);

        h.upstream.write_all(&OK_PACKET).await.expect("write");
        let mut reply = [0u8; OK_PACKET.len()];
        h.client.read_exact(&mut reply).await.expect("read");
        assert_eq!(reply, OK_PACKET);
    }

    #[tokio::test]
    async fn update_is_rejected_and_pair_closed() {
        let mut h = start(settings(false));
        h.client
            .write_all(&command(COM_QUERY, "UPDATE t SET x=1"))
            .await
            .expect("write");

        let response = read_all(&mut h.client).await;
        assert_eq!(response, rejection().encode().to_vec());
        let packet = decode_err_packet(&response).expect("err packet");
        assert_eq!(packet.code, UPDATE_REJECTED_CODE);
        assert_eq!(packet.message, UPDATE_REJECTED_MESSAGE);

        assert!(read_all(&mut h.upstream).await.is_empty());
        assert!(matches!(h.to_server.await.expect("join"), RelayExit::Blocked));
        assert!(matches!(
            h.to_client.await.expect("join"),
            RelayExit::RejectDelivered
        ));
    }

    #[tokio::test]
    async fn nothing_after_a_blocked_statement_is_forwarded() {
        let mut h = start(settings(false));
        let first = command(COM_QUERY, "SELECT 1");
        let mut wire = first.clone();
        wire.extend(command(COM_QUERY, "/* comment */ update t set x=1"));
        wire.extend(command(COM_QUERY, "SELECT 2"));
        h.client.write_all(&wire).await.expect("write");

        assert_eq!(read_all(&mut h.upstream).await, first);
        let response = read_all(&mut h.client).await;
        assert_eq!(decode_err_packet(&response).expect("err").code, 1064);
    }

    #[tokio::test]
    async fn prepared_update_is_rejected() {
        let mut h = start(settings(false));
        h.client
            .write_all(&command(COM_STMT_PREPARE, "update t set x=? where id=?"))
            .await
            .expect("write");
        let response = read_all(&mut h.client).await;
        assert_eq!(decode_err_packet(&response).expect("err").code, 1064);
        assert!(read_all(&mut h.upstream).await.is_empty());
    }

    #[tokio::test]
    async fn updated_at_column_reaches_upstream() {
        let mut h = start(settings(false));
        let query = command(COM_QUERY, "SELECT UPDATED_AT FROM t");
        h.client.write_all(&query).await.expect("write");
        let mut forwarded = vec![0u8; query.len()];
        h.upstream.read_exact(&mut forwarded).await.expect("read");
        assert_eq!(forwarded, query);
    }

    #[tokio::test]
    async fn client_close_tears_down_both_directions() {
        let mut h = start(settings(false));
        let query = command(COM_QUERY, "SELECT 1");
        h.client.write_all(&query).await.expect("write");
        h.client.shutdown().await.expect("shutdown");

        assert_eq!(read_all(&mut h.upstream).await, query);
        assert!(read_all(&mut h.client).await.is_empty());
        assert!(matches!(h.to_server.await.expect("join"), RelayExit::Eof));
        assert!(matches!(h.to_client.await.expect("join"), RelayExit::PeerClosed));
    }

    fn packet(sequence: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = (payload.len() as u32).to_le_bytes()[..3].to_vec();
        buf.push(sequence);
        buf.extend_from_slice(payload);
        buf
    }

    /// A COM_QUERY whose payload fills a whole packet, so the statement goes on
    /// in the next one.
    fn max_length_query() -> Vec<u8> {
        let mut buf = vec![0xff, 0xff, 0xff, 0x00, COM_QUERY];
        buf.extend_from_slice(b"SELECT '");
        buf.resize(HEADER_LEN + MAX_PAYLOAD_LEN, b'a');
        buf
    }

    #[tokio::test]
    async fn continuation_packet_is_forwarded_unclassified() {
        let h = start(settings(false));
        let Harness {
            mut client,
            mut upstream,
            to_server,
            ..
        } = h;
        let mut expected = max_length_query();
        expected.extend(packet(1, b"\x03UPDATE t' AS tail"));
        expected.extend(command(COM_QUERY, "SELECT 1"));

        let wire = expected.clone();
        let writer = tokio::spawn(async move {
            client.write_all(&wire).await.expect("write");
            client
        });

        let mut forwarded = vec![0u8; expected.len()];
        timeout(Duration::from_secs(30), upstream.read_exact(&mut forwarded))
            .await
            .expect("forwarded in time")
            .expect("read");
        assert!(forwarded == expected, "continuation was not relayed verbatim");

        let mut client = writer.await.expect("join");
        upstream.write_all(&OK_PACKET).await.expect("write");
        let mut reply = [0u8; OK_PACKET.len()];
        client.read_exact(&mut reply).await.expect("read");
        assert_eq!(reply, OK_PACKET);
        assert!(!to_server.is_finished());
    }

    #[tokio::test]
    async fn command_after_continuation_is_classified() {
        let h = start(settings(false));
        let Harness {
            client,
            mut upstream,
            to_server,
            ..
        } = h;
        let mut allowed = max_length_query();
        allowed.extend(packet(1, b"'"));
        let mut wire = allowed.clone();
        wire.extend(command(COM_QUERY, "UPDATE t SET x=1"));

        let writer = tokio::spawn(async move {
            let mut client = client;
            client.write_all(&wire).await.expect("write");
            client
        });

        let forwarded = read_all(&mut upstream).await;
        assert_eq!(forwarded.len(), allowed.len());
        assert!(forwarded == allowed, "statement start was not relayed verbatim");

        let mut client = writer.await.expect("join");
        let response = read_all(&mut client).await;
        assert_eq!(decode_err_packet(&response).expect("err").code, 1064);
        assert!(matches!(to_server.await.expect("join"), RelayExit::Blocked));
    }

    #[tokio::test]
    async fn server_traffic_is_copied_verbatim_by_default() {
        let mut h = start(settings(false));
        let looks_like_update = command(COM_QUERY, "UPDATE t SET x=1");
        h.upstream.write_all(&looks_like_update).await.expect("write");
        let mut got = vec![0u8; looks_like_update.len()];
        h.client.read_exact(&mut got).await.expect("read");
        assert_eq!(got, looks_like_update);
    }

    #[tokio::test]
    async fn server_traffic_inspection_rejects_towards_upstream() {
        let mut h = start(settings(true));
        h.upstream.write_all(&OK_PACKET).await.expect("write");
        let mut reply = [0u8; OK_PACKET.len()];
        h.client.read_exact(&mut reply).await.expect("read");
        assert_eq!(reply, OK_PACKET);

        h.upstream
            .write_all(&command(COM_QUERY, "UPDATE t SET x=1"))
            .await
            .expect("write");
        let response = read_all(&mut h.upstream).await;
        assert_eq!(decode_err_packet(&response).expect("err").code, 1064);
        assert!(read_all(&mut h.client).await.is_empty());
        assert!(matches!(h.to_client.await.expect("join"), RelayExit::Blocked));
    }

    #[test]
    fn config_defaults_and_overrides() {
        let config = Config::parse("").expect("empty config");
        assert_eq!(config.server.listen_addr, "localhost:3306");
        assert_eq!(config.upstream.addr, "mysql-server:3306");
        assert_eq!(config.relay.copy_buffer_bytes, 4096);
        assert!(!config.policy.inspect_server_traffic);
        assert!(!config.metrics.enabled);

        let config = Config::parse(
            "[server]\nlisten_addr = \"127.0.0.1:4000\"\n\n[policy]\ninspect_server_traffic = true\n\n[logging]\nlevel = \"debug\"\n",
        )
        .expect("config");
        assert_eq!(config.server.listen_addr, "127.0.0.1:4000");
        assert!(config.policy.inspect_server_traffic);
        assert_eq!(config.logging.max_level().expect("level"), tracing::Level::DEBUG);
    }

    #[test]
    fn config_validation_rejects_bad_values() {
        assert!(Config::parse("[relay]\ncopy_buffer_bytes = 0\n").is_err());
        assert!(Config::parse("[logging]\nlevel = \"loud\"\n").is_err());
        assert!(Config::parse("[upstream]\naddr = \"\"\n").is_err());
        assert!(Config::parse("[metrics]\nenabled = true\nlisten_addr = \" \"\n").is_err());
    }

    async fn echo_upstream() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (mut rd, mut wr) = socket.into_split();
                    let _ = tokio::io::copy(&mut rd, &mut wr).await;
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn connections_are_isolated_end_to_end() {
        let upstream_addr = echo_upstream().await;
        let config = Config::parse(&format!(
            "[server]\nlisten_addr = \"127.0.0.1:0\"\n\n[upstream]\naddr = \"{upstream_addr}\"\n"
        ))
        .expect("config");
        let server = ProxyServer::bind(&config).await.expect("bind");
        let proxy_addr = server.local_addr().expect("addr");
        tokio::spawn(server.serve());

        let mut reader = TcpStream::connect(proxy_addr).await.expect("connect");
        let mut writer = TcpStream::connect(proxy_addr).await.expect("connect");

        let select = command(COM_QUERY, "SELECT * FROM t");
        reader.write_all(&select).await.expect("write");
        let mut echoed = vec![0u8; select.len()];
        reader.read_exact(&mut echoed).await.expect("read");
        assert_eq!(echoed, select);

        writer
            .write_all(&command(COM_QUERY, "UPDATE t SET x=1"))
            .await
            .expect("write");
        let response = read_all(&mut writer).await;
        assert_eq!(decode_err_packet(&response).expect("err").code, 1064);

        let select = command(COM_QUERY, "SELECT id, updated_at FROM t");
        reader.write_all(&select).await.expect("write");
        let mut echoed = vec![0u8; select.len()];
        reader.read_exact(&mut echoed).await.expect("read");
        assert_eq!(echoed, select);
    }
}
