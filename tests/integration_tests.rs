use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::JoinHandle,
};
use tokio_util::codec::Framed;
use ttlkv::{
    common::{
        codec::{encode_request, RESP3Codec, Request},
        command_line::command_line_frame,
        resp3::RESP3Value,
    },
    server::{
        clock::SystemClock, config::StoreConfig, connection_manager::ConnectionManagerHandle,
        server::Server,
    },
};

struct TestServer {
    addr: SocketAddr,
    conn_manager: ConnectionManagerHandle,
    join: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

async fn start_server() -> TestServer {
    let tcp_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp_listener.local_addr().unwrap();

    let config = StoreConfig::default().with_sweep_interval(Duration::from_millis(50));
    let server = Server::with_config(tcp_listener, config, Arc::new(SystemClock));
    let conn_manager = server.conn_manager();
    let (shutdown, shutdown_signal) = oneshot::channel::<()>();

    let join = tokio::spawn(async move {
        server
            .run_until(async {
                let _ = shutdown_signal.await;
            })
            .await
            .unwrap();
    });

    TestServer {
        addr,
        conn_manager,
        join,
        shutdown,
    }
}

async fn connect_client(addr: SocketAddr) -> Framed<TcpStream, RESP3Codec> {
    let stream = TcpStream::connect(addr).await.unwrap();
    Framed::new(stream, RESP3Codec)
}

async fn fire_command(client: &mut Framed<TcpStream, RESP3Codec>, command: &str) -> RESP3Value {
    let frame = command_line_frame(command).unwrap().unwrap();
    client.send(frame).await.unwrap();
    client.next().await.unwrap().unwrap()
}

async fn delete_test_keys(client: &mut Framed<TcpStream, RESP3Codec>, keys: &[&str]) {
    fire_command(client, &format!("DEL {}", keys.join(" "))).await;
}

fn ok() -> RESP3Value {
    RESP3Value::ok()
}

fn nil() -> RESP3Value {
    RESP3Value::Null
}

fn value(s: &str) -> RESP3Value {
    RESP3Value::bulk(s)
}

fn int(n: i64) -> RESP3Value {
    RESP3Value::Integer(n)
}

fn unix_now() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap()
}

/// Run each case on a clean set of keys and compare every reply in order.
async fn run_cases(cases: Vec<(&str, Vec<String>, Vec<RESP3Value>)>) {
    let server = start_server().await;
    let mut client = connect_client(server.addr).await;

    for (name, commands, expected) in cases {
        delete_test_keys(&mut client, &["k", "k1", "k2"]).await;
        for (command, expected) in commands.iter().zip(expected) {
            let result = fire_command(&mut client, command).await;
            assert_eq!(result, expected, "case '{name}', command '{command}'");
        }
    }

    server.join.abort();
}

fn commands(commands: &[&str]) -> Vec<String> {
    commands.iter().map(|c| c.to_string()).collect()
}

#[tokio::test]
async fn test_set() {
    run_cases(vec![
        (
            "Set and Get Simple Value",
            commands(&["SET k v", "GET k"]),
            vec![ok(), value("v")],
        ),
        (
            "Overwrite Existing Key",
            commands(&["SET k v1", "SET k v2", "GET k"]),
            vec![ok(), ok(), value("v2")],
        ),
        (
            "Delete Existing And Missing Key",
            commands(&["SET k v", "DEL k", "GET k", "DEL k", "DEL k"]),
            vec![ok(), int(1), nil(), int(0), int(0)],
        ),
    ])
    .await;
}

#[tokio::test]
async fn test_set_conditions() {
    run_cases(vec![
        (
            "XX on non-existing key",
            commands(&["DEL k", "SET k v XX", "GET k"]),
            vec![int(0), nil(), nil()],
        ),
        (
            "XX on existing key",
            commands(&["SET k v1", "SET k v2 XX", "GET k"]),
            vec![ok(), ok(), value("v2")],
        ),
        (
            "Multiple XX operations",
            commands(&["SET k v1", "SET k v2 XX", "SET k v3 XX", "GET k"]),
            vec![ok(), ok(), ok(), value("v3")],
        ),
        (
            "NX on existing key",
            commands(&["SET k v1 NX", "SET k v2 NX", "GET k"]),
            vec![ok(), nil(), value("v1")],
        ),
        (
            "Conflicting conditions",
            commands(&["SET k v NX XX", "GET k"]),
            vec![
                RESP3Value::SimpleError("ERR syntax error".to_string()),
                nil(),
            ],
        ),
    ])
    .await;
}

#[tokio::test]
async fn test_set_absolute_expiry() {
    let expiry_time_in_ms = (unix_now() + Duration::from_secs(60)).as_millis();
    let expiry_time_in_sec = (unix_now() + Duration::from_secs(60)).as_secs();

    run_cases(vec![
        (
            "PXAT option",
            vec![format!("SET k v PXAT {expiry_time_in_ms}"), "GET k".to_string()],
            vec![ok(), value("v")],
        ),
        (
            "PXAT option with invalid unix time ms",
            commands(&["SET k2 v2 PXAT 123123", "GET k2"]),
            vec![ok(), nil()],
        ),
        (
            "EXAT option",
            vec![format!("SET k v EXAT {expiry_time_in_sec}"), "GET k".to_string()],
            vec![ok(), value("v")],
        ),
        (
            "EXAT option with invalid unix time ms",
            commands(&["SET k2 v2 EXAT 123123", "GET k2"]),
            vec![ok(), nil()],
        ),
    ])
    .await;
}

#[tokio::test]
async fn test_pxat_with_delete() {
    let expiry_time_in_ms = (unix_now() + Duration::from_secs(60)).as_millis();

    run_cases(vec![(
        "PXAT option with delete",
        vec![
            format!("SET k1 v1 PXAT {expiry_time_in_ms}"),
            "GET k1".to_string(),
            "SLEEP 2".to_string(),
            "DEL k1".to_string(),
        ],
        vec![ok(), value("v1"), ok(), int(1)],
    )])
    .await;
}

#[tokio::test]
async fn test_exat_with_delete() {
    let expiry_time_in_sec = (unix_now() + Duration::from_secs(60)).as_secs();

    run_cases(vec![(
        "EXAT option with delete",
        vec![
            format!("SET k1 v1 EXAT {expiry_time_in_sec}"),
            "GET k1".to_string(),
            "SLEEP 2".to_string(),
            "DEL k1".to_string(),
        ],
        vec![ok(), value("v1"), ok(), int(1)],
    )])
    .await;
}

#[tokio::test]
async fn test_ex_option() {
    run_cases(vec![(
        "EX option",
        commands(&["SET k v EX 1", "GET k", "SLEEP 2", "GET k"]),
        vec![ok(), value("v"), ok(), nil()],
    )])
    .await;
}

#[tokio::test]
async fn test_xx_with_ex_option() {
    run_cases(vec![(
        "XX option",
        commands(&[
            "SET k v XX EX 1",
            "GET k",
            "SLEEP 2",
            "GET k",
            "SET k v XX EX 1",
            "GET k",
            "SET k v EX 1",
            "GET k",
            "SLEEP 2",
            "GET k",
        ]),
        vec![
            nil(),
            nil(),
            ok(),
            nil(),
            nil(),
            nil(),
            ok(),
            value("v"),
            ok(),
            nil(),
        ],
    )])
    .await;
}

#[tokio::test]
async fn test_px_option_and_sweep() {
    let server = start_server().await;
    let mut client = connect_client(server.addr).await;

    assert_eq!(fire_command(&mut client, "SET k v PX 30").await, ok());
    assert_eq!(fire_command(&mut client, "SET k1 v1").await, ok());
    assert_eq!(fire_command(&mut client, "GET k").await, value("v"));

    tokio::time::sleep(Duration::from_millis(200)).await;

    // The sweep runs every 50ms, so the expired key is gone without being touched.
    assert_eq!(fire_command(&mut client, "DBSIZE").await, int(1));
    assert_eq!(fire_command(&mut client, "GET k").await, nil());
    assert_eq!(fire_command(&mut client, "GET k1").await, value("v1"));

    server.join.abort();
}

#[tokio::test]
async fn test_clients_share_the_store() {
    let server = start_server().await;
    let mut writer = connect_client(server.addr).await;
    let mut reader = connect_client(server.addr).await;

    let request = Request::Set {
        key: "shared".into(),
        value: "hello world".into(),
        options: Default::default(),
    };
    writer.send(encode_request(&request)).await.unwrap();
    assert_eq!(writer.next().await.unwrap().unwrap(), ok());

    assert_eq!(
        fire_command(&mut reader, "GET shared").await,
        value("hello world")
    );
    assert_eq!(fire_command(&mut reader, "DEL shared missing").await, int(1));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.conn_manager.client_count().await.unwrap(), 2);

    drop(writer);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.conn_manager.client_count().await.unwrap(), 1);

    server.join.abort();
}

#[tokio::test]
async fn test_invalid_frame_closes_only_that_connection() {
    let server = start_server().await;
    let mut good = connect_client(server.addr).await;

    let mut bad = TcpStream::connect(server.addr).await.unwrap();
    tokio::io::AsyncWriteExt::write_all(&mut bad, b"?garbage\r\n")
        .await
        .unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::io::AsyncReadExt::read(&mut bad, &mut buf).await;
    assert!(matches!(read, Ok(0) | Err(_)), "unexpected read {read:?}");

    assert_eq!(
        fire_command(&mut good, "PING").await,
        RESP3Value::SimpleString("PONG".to_string())
    );

    server.join.abort();
}

#[tokio::test]
async fn test_hostile_frames_close_only_that_connection() {
    let server = start_server().await;
    let mut good = connect_client(server.addr).await;
    assert_eq!(fire_command(&mut good, "SET k v").await, ok());

    let deep_nesting = b"*1\r\n".repeat(200_000);
    let hostile: [&[u8]; 2] = [b"$18446744073709551615\r\nabc\r\n", &deep_nesting];
    for frame in hostile {
        let mut bad = TcpStream::connect(server.addr).await.unwrap();
        // The server may hang up before the whole frame is written.
        let _ = tokio::io::AsyncWriteExt::write_all(&mut bad, frame).await;
        let mut buf = [0u8; 16];
        let read = tokio::io::AsyncReadExt::read(&mut bad, &mut buf).await;
        assert!(matches!(read, Ok(0) | Err(_)), "unexpected read {read:?}");
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.conn_manager.client_count().await.unwrap(), 1);
    assert_eq!(fire_command(&mut good, "GET k").await, value("v"));

    server.join.abort();
}

#[tokio::test]
async fn test_graceful_shutdown_closes_clients() {
    let server = start_server().await;
    let mut client = connect_client(server.addr).await;

    assert_eq!(fire_command(&mut client, "SET k v").await, ok());

    server.shutdown.send(()).unwrap();
    server.join.await.unwrap();

    assert!(client.next().await.is_none());
}
