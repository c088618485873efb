use std::collections::HashSet;
use std::process::Stdio;

use tokio::process::Command;

use gtp::GtpSession;

use crate::error::ArbiterError;
use crate::player::Player;

const REQUIRED_COMMANDS: &[&str] = &[
    "known_command",
    "name",
    "version",
    "quit",
    "boardsize",
    "komi",
    "clear_board",
    "final_score",
    "play",
    "move_history",
];

/// A spawned local GTP engine acting as referee: it tracks the board
/// independently of both players and decides whether moves are legal and
/// whether the game has ended. Trusted and local, so commands sent to it
/// carry no timeout.
pub struct Referee {
    pub name: String,
    session: GtpSession,
    child: tokio::process::Child,
}

impl Referee {
    pub async fn spawn(command: &str, setup_commands: &[String]) -> Result<Referee, ArbiterError> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ArbiterError::RefereeSetup("empty referee command".to_string()))?;

        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ArbiterError::RefereeSetup("referee stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ArbiterError::RefereeSetup("referee stdout unavailable".to_string()))?;
        let session = GtpSession::new(stdout, stdin);

        for cmd in REQUIRED_COMMANDS {
            let lines = session.send_command(&format!("known_command {cmd}")).await;
            if lines.first().map(String::as_str) != Some("= true") {
                return Err(gtp::GtpError::RequiredCapabilityMissing(cmd.to_string()).into());
            }
        }

        for cmd in setup_commands {
            session.send_command(cmd).await;
        }

        let name_reply = session.send_command("name").await;
        let version_reply = session.send_command("version").await;
        let name = format!("{} {}", strip_reply(&name_reply), strip_reply(&version_reply));

        Ok(Referee {
            name,
            session,
            child,
        })
    }

    pub async fn send_command(&self, command: &str) -> Vec<String> {
        self.session.send_command(command).await
    }

    /// Replay the engine's own move history into a newly joined (or
    /// reconnected) player, oldest move first.
    pub async fn prepare_player(&self, player: &Player) {
        let entries = move_history_lines(&self.session.send_command("move_history").await);
        for entry in entries.iter().rev() {
            player
                .send_command_timeout(&format!("play {entry}"), gtp::DEFAULT_COMMAND_TIMEOUT)
                .await;
        }
    }

    /// True once the two most recent moves, in either order, are both
    /// passes from the respective colours.
    pub async fn game_ended(&self) -> bool {
        let entries = move_history_lines(&self.session.send_command("move_history").await);
        let set: HashSet<String> = entries
            .into_iter()
            .take(2)
            .map(|e| e.to_ascii_lowercase())
            .collect();
        let expected: HashSet<String> = ["black pass".to_string(), "white pass".to_string()]
            .into_iter()
            .collect();
        set == expected
    }

    pub async fn quit(&mut self) {
        self.session.send_command("quit").await;
        let _ = self.child.kill().await;
    }
}

fn strip_reply(lines: &[String]) -> String {
    lines
        .first()
        .and_then(|l| l.strip_prefix("= "))
        .unwrap_or("")
        .to_string()
}

/// A `move_history` reply is one move per line, newest first, with the
/// leading `"= "` stripped off the first line only. Blank entries (an empty
/// first line when no moves have been played yet) are dropped.
fn move_history_lines(reply: &[String]) -> Vec<String> {
    reply
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                line.strip_prefix("= ").unwrap_or(line).trim().to_string()
            } else {
                line.trim().to_string()
            }
        })
        .filter(|line| !line.is_empty())
        .collect()
}
