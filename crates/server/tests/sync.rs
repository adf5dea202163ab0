//! Unreliable-channel tests: position reports, snapshots, logout and
//! eviction against a real server over loopback UDP.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;

use wanderlore_protocol::{
    encode_datagram, messages, read_frame, write_frame, ClientCommand, Datagram, Hello, HelloAck,
    KeyPair, PeerKey, RosterSnapshot, ServerReply, MAX_DATAGRAM_LEN,
};
use wanderlore_server::{MemoryCredentialStore, MemoryStoryStore, ServerConfig, WanderServer};

fn server_keys() -> KeyPair {
    static KEYS: OnceLock<KeyPair> = OnceLock::new();
    KEYS.get_or_init(|| KeyPair::generate().unwrap()).clone()
}

fn client_keys() -> KeyPair {
    static KEYS: OnceLock<KeyPair> = OnceLock::new();
    KEYS.get_or_init(|| KeyPair::generate().unwrap()).clone()
}

async fn start_server() -> (SocketAddr, SocketAddr) {
    start_server_with(ServerConfig::default(), MemoryCredentialStore::new()).await
}

async fn start_server_with(
    config: ServerConfig,
    credentials: MemoryCredentialStore,
) -> (SocketAddr, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let tcp_addr = listener.local_addr().unwrap();
    let udp_addr = socket.local_addr().unwrap();

    let server = WanderServer::new(
        config,
        server_keys(),
        Arc::new(credentials),
        Arc::new(MemoryStoryStore::new()),
    );
    tokio::spawn(async move {
        let _ = server.serve(listener, socket).await;
    });

    (tcp_addr, udp_addr)
}

/// Send one position report and wait for the snapshot it earns.
async fn report(
    socket: &UdpSocket,
    server: SocketAddr,
    username: &str,
    x: f32,
    y: f32,
    seq: u64,
) -> RosterSnapshot {
    let datagram = Datagram::SendPlayerData {
        username: username.to_string(),
        pos_x: x,
        pos_y: y,
        seq,
    };
    socket
        .send_to(&encode_datagram(&datagram).unwrap(), server)
        .await
        .unwrap();

    let mut buf = [0u8; MAX_DATAGRAM_LEN];
    let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    serde_json::from_slice(&buf[..len]).unwrap()
}

async fn logout(socket: &UdpSocket, server: SocketAddr, username: &str) -> String {
    let datagram = Datagram::Logout {
        username: username.to_string(),
    };
    socket
        .send_to(&encode_datagram(&datagram).unwrap(), server)
        .await
        .unwrap();

    let mut buf = [0u8; MAX_DATAGRAM_LEN];
    let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    String::from_utf8(buf[..len].to_vec()).unwrap()
}

#[tokio::test]
async fn test_position_report_returns_full_roster() {
    let (_, udp_addr) = start_server().await;
    let ada = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let brin = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let snapshot = report(&ada, udp_addr, "ada", 1.0, 2.0, 1).await;
    assert_eq!(snapshot.num_players, 1);
    assert_eq!(snapshot.players[0].username, "ada");
    assert_eq!(snapshot.players[0].pos_x, 1.0);
    assert_eq!(snapshot.players[0].pos_y, 2.0);

    // The second reporter sees everyone, in arrival order.
    let snapshot = report(&brin, udp_addr, "brin", -3.0, 4.5, 1).await;
    assert_eq!(snapshot.num_players, 2);
    let names: Vec<&str> = snapshot
        .players
        .iter()
        .map(|p| p.username.as_str())
        .collect();
    assert_eq!(names, vec!["ada", "brin"]);
}

#[tokio::test]
async fn test_snapshot_goes_only_to_sender() {
    let (_, udp_addr) = start_server().await;
    let ada = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let brin = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    report(&ada, udp_addr, "ada", 0.0, 0.0, 1).await;
    let snapshot = report(&brin, udp_addr, "brin", 1.0, 1.0, 1).await;
    assert_eq!(snapshot.num_players, 2);

    // Brin's snapshot proves the server processed both reports; ada must
    // have nothing waiting.
    let mut buf = [0u8; MAX_DATAGRAM_LEN];
    let err = ada.try_recv_from(&mut buf).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
}

#[tokio::test]
async fn test_second_report_updates_instead_of_duplicating() {
    let (_, udp_addr) = start_server().await;
    let ada = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let snapshot = report(&ada, udp_addr, "ada", 1.0, 1.0, 1).await;
    assert_eq!(snapshot.num_players, 1);

    let snapshot = report(&ada, udp_addr, "ada", 5.0, -6.0, 2).await;
    assert_eq!(snapshot.num_players, 1);
    assert_eq!(snapshot.players[0].pos_x, 5.0);
    assert_eq!(snapshot.players[0].pos_y, -6.0);
}

#[tokio::test]
async fn test_stale_report_keeps_newer_position() {
    let (_, udp_addr) = start_server().await;
    let ada = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    report(&ada, udp_addr, "ada", 1.0, 1.0, 5).await;

    // A report with an older sequence number still earns a snapshot but
    // must not move the player.
    let snapshot = report(&ada, udp_addr, "ada", 9.0, 9.0, 3).await;
    assert_eq!(snapshot.num_players, 1);
    assert_eq!(snapshot.players[0].pos_x, 1.0);
    assert_eq!(snapshot.players[0].pos_y, 1.0);
}

#[tokio::test]
async fn test_udp_logout_replies() {
    let (_, udp_addr) = start_server().await;
    let ada = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    report(&ada, udp_addr, "ada", 0.0, 0.0, 1).await;

    let reply = logout(&ada, udp_addr, "ada").await;
    assert_eq!(reply, messages::LOGOUT_OK);

    let reply = logout(&ada, udp_addr, "ada").await;
    assert_eq!(reply, messages::LOGOUT_UNKNOWN);
}

#[tokio::test]
async fn test_malformed_datagram_is_skipped() {
    let (_, udp_addr) = start_server().await;
    let ada = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    ada.send_to(b"definitely not json", udp_addr).await.unwrap();

    // Had the server replied to the garbage, this would read that reply
    // first and fail to parse it as a snapshot.
    let snapshot = report(&ada, udp_addr, "ada", 2.0, 2.0, 1).await;
    assert_eq!(snapshot.num_players, 1);
}

#[tokio::test]
async fn test_unknown_action_is_skipped() {
    let (_, udp_addr) = start_server().await;
    let ada = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    ada.send_to(br#"{"action":"teleport","username":"ada"}"#, udp_addr)
        .await
        .unwrap();

    let snapshot = report(&ada, udp_addr, "ada", 2.0, 2.0, 1).await;
    assert_eq!(snapshot.num_players, 1);
}

#[tokio::test]
async fn test_tcp_logout_clears_roster() {
    let creds = MemoryCredentialStore::new().with_user("Ada Lovelace", "ada", "hunter2");
    let (tcp_addr, udp_addr) = start_server_with(ServerConfig::default(), creds).await;

    let ada_udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let snapshot = report(&ada_udp, udp_addr, "ada", 1.0, 1.0, 1).await;
    assert_eq!(snapshot.num_players, 1);

    // Log in and out over the reliable channel.
    let stream = TcpStream::connect(tcp_addr).await.unwrap();
    let (mut reader, mut writer) = stream.into_split();
    let hello = Hello {
        public_key_pem: client_keys().public_key_pem().unwrap(),
    };
    write_frame(&mut writer, &hello).await.unwrap();
    let ack: HelloAck = read_frame(&mut reader).await.unwrap();
    let server_key = PeerKey::from_pem(&ack.public_key_pem).unwrap();

    let sealed = server_key
        .seal(messages::join_login("ada", "hunter2").as_bytes())
        .unwrap();
    write_frame(
        &mut writer,
        &ClientCommand::Login {
            sealed_credentials: sealed,
        },
    )
    .await
    .unwrap();
    let reply: ServerReply = read_frame(&mut reader).await.unwrap();
    assert_eq!(reply, ServerReply::LoginResult { ok: true });

    write_frame(
        &mut writer,
        &ClientCommand::Logout {
            username: "ada".to_string(),
        },
    )
    .await
    .unwrap();
    let reply: ServerReply = read_frame(&mut reader).await.unwrap();
    assert_eq!(
        reply,
        ServerReply::LogoutResult {
            message: "Logout successful.".to_string(),
        }
    );

    // The removal funnels through the synchronizer, so give it a moment.
    let wanda = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut seq = 0;
    for _ in 0..50 {
        seq += 1;
        let snapshot = report(&wanda, udp_addr, "wanda", 0.0, 0.0, seq).await;
        if snapshot.players.iter().all(|p| p.username != "ada") {
            assert_eq!(snapshot.num_players, 1);
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("player was still on the roster after logging out");
}

#[tokio::test]
async fn test_stale_players_are_evicted() {
    let config = ServerConfig {
        stale_after: Duration::from_millis(150),
        sweep_interval: Duration::from_millis(50),
        ..ServerConfig::default()
    };
    let (_, udp_addr) = start_server_with(config, MemoryCredentialStore::new()).await;

    let ada = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let wanda = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    report(&ada, udp_addr, "ada", 1.0, 1.0, 1).await;

    // Wanda keeps reporting and stays fresh; silent ada must disappear.
    let mut seq = 0;
    for _ in 0..40 {
        seq += 1;
        let snapshot = report(&wanda, udp_addr, "wanda", 0.0, 0.0, seq).await;
        if snapshot.players.iter().all(|p| p.username != "ada") {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("idle player was never evicted");
}
