use std::sync::Arc;

use tokio::net::TcpListener;

use arbiter::{MatchState, Player};

/// Accepts connections forever, matching each one's id line to a match and
/// colour slot. Unrecognized ids and duplicate colour connections are
/// logged and dropped; nothing here can take a match down.
pub async fn accept_loop(
    listener: TcpListener,
    matches: Arc<Vec<Arc<MatchState>>>,
    setup_commands: Arc<Vec<String>>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };
        let matches = matches.clone();
        let setup_commands = setup_commands.clone();
        tokio::spawn(async move {
            handle_connection(stream, &matches, &setup_commands, peer).await;
        });
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    matches: &[Arc<MatchState>],
    setup_commands: &[String],
    peer: std::net::SocketAddr,
) {
    let player = match Player::accept(stream).await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(%peer, error = %e, "player setup failed");
            return;
        }
    };

    for m in matches {
        if m.is_finished() || m.colour_for_id(&player.id).is_none() {
            continue;
        }
        let id = player.id.clone();
        match m.attach_player(player, setup_commands).await {
            Ok(()) => tracing::info!(%peer, id, match_name = %m.name, "player joined"),
            Err(_) => tracing::warn!(%peer, id, match_name = %m.name, "duplicate connection for occupied colour"),
        }
        return;
    }

    tracing::warn!(%peer, id = %player.id, "no match found for connecting id");
}
