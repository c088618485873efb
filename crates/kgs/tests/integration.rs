//! Exercises `KgsSession` against a tiny hand-rolled HTTP/1.1 stub that
//! speaks just enough of the long-poll contract to drive sign-in, demo
//! creation, and the move-echo round trip, including the "message arrives
//! before the POST response" correlation race.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use kgs::KgsSession;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

async fn start_stub() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let outbox: Arc<Mutex<VecDeque<Value>>> = Arc::new(Mutex::new(VecDeque::new()));

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let outbox = outbox.clone();
            tokio::spawn(handle_conn(stream, outbox));
        }
    });

    format!("http://{addr}/")
}

async fn handle_conn(mut stream: tokio::net::TcpStream, outbox: Arc<Mutex<VecDeque<Value>>>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        let Some(header_end) = find_header_end(&buf) else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = parse_content_length(&headers);
        while buf.len() < header_end + content_length {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        let body = &buf[header_end..(header_end + content_length).min(buf.len())];

        if headers.starts_with("POST") {
            let value: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
            auto_respond(&value, &outbox).await;
            let resp = b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nOK";
            let _ = stream.write_all(resp).await;
        } else {
            let mut messages = Vec::new();
            for _ in 0..100 {
                {
                    let mut q = outbox.lock().await;
                    if !q.is_empty() {
                        messages.extend(q.drain(..));
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            let payload = json!({"messages": messages}).to_string();
            let resp = format!(
                "HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                payload.len(),
                payload
            );
            let _ = stream.write_all(resp.as_bytes()).await;
        }
        return;
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn parse_content_length(headers: &str) -> usize {
    headers
        .lines()
        .find_map(|l| l.to_ascii_lowercase().starts_with("content-length:").then(|| {
            l.split(':').nth(1).unwrap_or("0").trim().parse().unwrap_or(0)
        }))
        .unwrap_or(0)
}

/// Simulates the remote server's side effects, including pushing the
/// correlated reply into the long-poll outbox *before* the POST's own "OK"
/// response is written — the race `endWait` must survive via its recent log.
async fn auto_respond(value: &Value, outbox: &Arc<Mutex<VecDeque<Value>>>) {
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return;
    };
    match kind {
        "LOGIN" => {
            outbox.lock().await.push_back(json!({"type": "LOGIN_SUCCESS"}));
        }
        "CHALLENGE_CREATE" => {
            let mut q = outbox.lock().await;
            q.push_back(json!({"type": "GAME_NOTIFY", "game": {"channelId": 42}}));
            q.push_back(json!({"type": "GAME_JOIN", "channelId": 42, "sgfEvents": []}));
        }
        "KGS_SGF_CHANGE" => {
            if let Some(channel_id) = value.get("channelId").cloned() {
                let events = value.get("sgfEvents").cloned().unwrap_or_else(|| json!([]));
                outbox
                    .lock()
                    .await
                    .push_back(json!({"type": "GAME_UPDATE", "channelId": channel_id, "sgfEvents": events}));
            }
        }
        "LOGOUT" => {
            outbox.lock().await.push_back(json!({"type": "LOGOUT"}));
        }
        _ => {}
    }
}

#[tokio::test]
async fn sign_in_and_terminate() {
    let api = start_stub().await;
    let session = KgsSession::connect(&api, "alice", "secret").await.unwrap();
    session.terminate().await;
    assert!(session.is_terminated());
}

#[tokio::test]
async fn create_demo_survives_notify_before_post_returns() {
    let api = start_stub().await;
    let session = KgsSession::connect(&api, "alice", "secret").await.unwrap();

    let channel = session
        .create_demo(7, 19, 7.5, "canadian", 1200.0, 30.0, 5, "alice")
        .await;
    assert_eq!(channel, Some(42));

    session.terminate().await;
}

#[tokio::test]
async fn demo_play_move_round_trips_through_echo() {
    let api = start_stub().await;
    let session = KgsSession::connect(&api, "alice", "secret").await.unwrap();
    let channel = session
        .create_demo(7, 19, 7.5, "canadian", 1200.0, 30.0, 5, "alice")
        .await
        .unwrap();

    let result = session.demo_play_move(channel, "black", "k10").await;
    assert_eq!(result, Some(()));

    session.terminate().await;
}
