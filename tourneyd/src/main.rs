mod config;
mod server;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use arbiter::{MatchState, Referee};
use config::Config;
use kgs::KgsSession;

#[derive(Parser, Debug)]
#[command(name = "tourneyd")]
#[command(about = "GTP tournament server with a live KGS demo mirror")]
struct Args {
    /// Path to the tournament ini file
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load tournament config");
            std::process::exit(1);
        }
    };

    let mut matches = Vec::new();
    for game in &config.games {
        let referee = match Referee::spawn(&config.referee_cmd, &config.referee_setup_commands).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(game = %game.id, error = %e, "referee failed to start, skipping game");
                continue;
            }
        };

        let kgs = match KgsSession::connect(&config.kgs_api, &game.kgs_name, &game.kgs_password).await {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(game = %game.id, error = %e, "KGS sign-in failed, running without mirror");
                None
            }
        };

        let (ids, names) = arbiter::assign_colours(
            [game.player1_id.clone(), game.player2_id.clone()],
            [game.player1.clone(), game.player2.clone()],
        );

        let kgs_channel = match &kgs {
            Some(session) => create_demo(session, &config, game, &names).await,
            None => None,
        };

        let m = Arc::new(MatchState::new(
            format!("game-{}", game.id),
            referee,
            kgs,
            kgs_channel,
            ids,
            names,
            config.main_time,
            config.byoyomi_time,
            config.byoyomi_moves,
        ));
        matches.push(m);
    }

    let listener = match TcpListener::bind((config.host.as_str(), config.port)).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind tournament listener");
            std::process::exit(1);
        }
    };
    tracing::info!(host = %config.host, port = config.port, "tourneyd listening");

    let matches_for_accept = Arc::new(matches.clone());
    let setup_commands = Arc::new(config.player_setup_commands.clone());
    let accept_handle = tokio::spawn(server::accept_loop(listener, matches_for_accept, setup_commands));

    let now = SystemTime::now();
    if let Ok(wait) = config.round_start.duration_since(now) {
        tracing::info!(?wait, "sleeping until round start");
        tokio::time::sleep(wait).await;
    }

    let mut handles = Vec::new();
    for m in matches {
        handles.push(tokio::spawn(async move { m.run().await }));
    }
    for h in handles {
        if let Err(e) = h.await {
            tracing::error!(error = %e, "match task panicked");
        }
    }

    accept_handle.abort();
}

async fn create_demo(
    session: &KgsSession,
    config: &Config,
    game: &config::GameConfig,
    names: &[String; 2],
) -> Option<i64> {
    let room_channel = session.channel_id_by_room_name(&game.kgs_room).await?;
    let time_system = if config.byoyomi_moves > 0 { "canadian" } else { "absolute" };
    let channel = session
        .create_demo(
            room_channel,
            19,
            7.5,
            time_system,
            config.main_time,
            config.byoyomi_time,
            config.byoyomi_moves as i64,
            &game.kgs_name,
        )
        .await?;
    session
        .demo_set_info(channel, &truncate10(&names[1]), &truncate10(&names[0]), "tourneyd", &game.kgs_room)
        .await;
    Some(channel)
}

fn truncate10(name: &str) -> String {
    name.chars().take(10).collect()
}
