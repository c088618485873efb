//! End-to-end turn-loop tests: a real spawned (shell-script) referee, two
//! fake GTP peers driven over real TCP loopback connections playing the
//! `Player` side of the protocol, and a `MatchState` wired between them.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use arbiter::{MatchState, Player, Referee};

const REQUIRED: &[&str] = &[
    "known_command",
    "name",
    "quit",
    "boardsize",
    "komi",
    "clear_board",
    "final_score",
    "final_status_list",
    "play",
    "genmove",
];

enum GenmoveAction {
    Reply(&'static str),
    Stall,
    Disconnect,
}

/// Drives the `Player` side of the wire protocol for one fake engine: sends
/// its id line, then answers every GTP command generically except
/// `genmove`, which is scripted per-call via `on_genmove`.
async fn fake_player(stream: TcpStream, id: String, mut on_genmove: impl FnMut(u32) -> GenmoveAction) {
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    write_half.write_all(format!("{id}\n").as_bytes()).await.unwrap();
    write_half.flush().await.unwrap();

    let mut genmove_count = 0u32;
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let cmd = line.trim_end();
        let head = cmd.split_whitespace().next().unwrap_or("");

        let reply = match head {
            "known_command" => {
                let arg = cmd.split_whitespace().nth(1).unwrap_or("");
                if REQUIRED.contains(&arg) {
                    "= true".to_string()
                } else {
                    "= false".to_string()
                }
            }
            "name" => "= fakeplayer".to_string(),
            "version" => "= 1.0".to_string(),
            "genmove" => {
                genmove_count += 1;
                match on_genmove(genmove_count) {
                    GenmoveAction::Reply(mv) => format!("= {mv}"),
                    GenmoveAction::Stall => {
                        std::future::pending::<()>().await;
                        unreachable!()
                    }
                    // Drop the connection right now instead of answering,
                    // simulating a socket that closes mid-turn.
                    GenmoveAction::Disconnect => return,
                }
            }
            _ => "= ".to_string(),
        };

        if write_half.write_all(format!("{reply}\n\n").as_bytes()).await.is_err() {
            break;
        }
        if write_half.flush().await.is_err() {
            break;
        }
    }
}

fn referee_path() -> String {
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/fake_referee.sh").to_string()
}

async fn new_match(main_time: f64, byoyomi_time: f64, byoyomi_moves: u32) -> (Arc<MatchState>, TcpListener) {
    let referee = Referee::spawn(&referee_path(), &[]).await.expect("referee spawn");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let match_state = MatchState::new(
        "test-match".to_string(),
        referee,
        None,
        None,
        ["p1".to_string(), "p2".to_string()],
        ["Player One".to_string(), "Player Two".to_string()],
        main_time,
        byoyomi_time,
        byoyomi_moves,
    );
    (Arc::new(match_state), listener)
}

async fn attach_both(match_state: &MatchState, listener: &TcpListener) {
    for _ in 0..2 {
        let (stream, _) = listener.accept().await.unwrap();
        let player = Player::accept(stream).await.unwrap();
        match_state.attach_player(player, &[]).await.unwrap();
    }
}

#[tokio::test]
async fn resignation_ends_match_with_result() {
    let (match_state, listener) = new_match(60.0, 0.0, 0).await;
    let addr = listener.local_addr().unwrap();
    let id0 = match_state.ids[0].clone();
    let id1 = match_state.ids[1].clone();

    tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await.unwrap();
        fake_player(stream, id0, |_| GenmoveAction::Reply("resign")).await;
    });
    tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await.unwrap();
        fake_player(stream, id1, |_| GenmoveAction::Reply("pass")).await;
    });

    attach_both(&match_state, &listener).await;

    tokio::time::timeout(Duration::from_secs(5), match_state.run())
        .await
        .expect("match did not finish in time");

    assert_eq!(match_state.result().await.as_deref(), Some("W+Resign"));
}

#[tokio::test]
async fn repeated_illegal_move_forfeits() {
    let (match_state, listener) = new_match(60.0, 0.0, 0).await;
    let addr = listener.local_addr().unwrap();
    let id0 = match_state.ids[0].clone();
    let id1 = match_state.ids[1].clone();

    tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await.unwrap();
        fake_player(stream, id0, |_| GenmoveAction::Reply("k10")).await;
    });
    tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await.unwrap();
        // Plays the same point Black just took; the referee rejects it.
        fake_player(stream, id1, |_| GenmoveAction::Reply("k10")).await;
    });

    attach_both(&match_state, &listener).await;

    tokio::time::timeout(Duration::from_secs(5), match_state.run())
        .await
        .expect("match did not finish in time");

    assert_eq!(match_state.result().await.as_deref(), Some("B+Forfeit"));
}

#[tokio::test]
async fn loss_on_time_ends_match() {
    // Main time alone (1s), no byo-yomi: Black's genmove never answers and
    // the connection never closes, so the turn loop's own per-move
    // deadline (bounded by the remaining main time) is what expires.
    let (match_state, listener) = new_match(1.0, 0.0, 0).await;
    let addr = listener.local_addr().unwrap();
    let id0 = match_state.ids[0].clone();
    let id1 = match_state.ids[1].clone();

    tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await.unwrap();
        fake_player(stream, id0, |_| GenmoveAction::Stall).await;
    });
    tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await.unwrap();
        fake_player(stream, id1, |_| GenmoveAction::Reply("pass")).await;
    });

    attach_both(&match_state, &listener).await;

    tokio::time::timeout(Duration::from_secs(5), match_state.run())
        .await
        .expect("match did not finish in time");

    assert_eq!(match_state.result().await.as_deref(), Some("W+Time"));
}

#[tokio::test]
async fn reconnect_mid_game_resumes_without_forfeit() {
    let (match_state, listener) = new_match(60.0, 0.0, 0).await;
    let addr = listener.local_addr().unwrap();
    let id0 = match_state.ids[0].clone();
    let id1 = match_state.ids[1].clone();

    // Black plays one move, then its fake peer drops the connection
    // instead of answering the second genmove.
    let id0_for_peer = id0.clone();
    tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await.unwrap();
        fake_player(stream, id0_for_peer, |call| {
            if call == 1 {
                GenmoveAction::Reply("q4")
            } else {
                GenmoveAction::Disconnect
            }
        })
        .await;
    });
    tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await.unwrap();
        fake_player(stream, id1, |_| GenmoveAction::Reply("pass")).await;
    });

    attach_both(&match_state, &listener).await;

    let match_state_for_run = match_state.clone();
    let run_handle = tokio::spawn(async move { match_state_for_run.run().await });

    // Give the first round a moment to play out and the loop to notice
    // Black's peer is gone, then reconnect under the same id.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!match_state.is_finished());

    let reconnect_stream = TcpStream::connect(addr).await.unwrap();
    let reconnect_id = id0.clone();
    tokio::spawn(async move {
        fake_player(reconnect_stream, reconnect_id, |_| GenmoveAction::Reply("resign")).await;
    });
    let reconnected = Player::accept(listener.accept().await.unwrap().0).await.unwrap();
    match_state.attach_player(reconnected, &[]).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), run_handle)
        .await
        .expect("match did not finish in time")
        .unwrap();

    // Black reconnected and resigned on its next turn rather than being
    // forfeited for the earlier disconnect, proving the turn loop waited
    // for the reconnect instead of resolving the round against it.
    assert_eq!(match_state.result().await.as_deref(), Some("W+Resign"));
}
