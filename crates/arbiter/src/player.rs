use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

use gtp::GtpSession;

use crate::colour::Colour;
use crate::error::ArbiterError;

/// The ten commands every connecting player must support, checked via
/// `known_command` before anything else happens on the connection.
const REQUIRED_COMMANDS: &[&str] = &[
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

/// One connected GTP engine acting as a match participant. Accepted over a
/// plain TCP connection: the very first line the client sends is its id,
/// everything after is ordinary GTP traffic.
pub struct Player {
    pub id: String,
    pub name: String,
    pub can_cleanup: bool,
    pub colour: Option<Colour>,
    session: GtpSession,
}

impl Player {
    /// Accept a connection, read its id line, and verify the capability set.
    /// Fails the whole connection if any required command is missing.
    pub async fn accept(stream: TcpStream) -> Result<Player, ArbiterError> {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);
        let mut id_line = String::new();
        reader.read_line(&mut id_line).await?;
        let id = id_line.trim_end_matches(['\r', '\n']).to_string();

        let session = GtpSession::new(reader, write_half);

        for cmd in REQUIRED_COMMANDS {
            let lines = session.send_command(&format!("known_command {cmd}")).await;
            if lines.first().map(String::as_str) != Some("= true") {
                return Err(gtp::GtpError::RequiredCapabilityMissing(cmd.to_string()).into());
            }
        }

        let can_cleanup = session
            .send_command("known_command kgs-genmove_cleanup")
            .await
            .first()
            .map(String::as_str)
            == Some("= true");

        let name_reply = session.send_command("name").await;
        let version_reply = session.send_command("version").await;
        let name = format!(
            "{} {}",
            strip_reply(&name_reply),
            strip_reply(&version_reply)
        );

        Ok(Player {
            id,
            name,
            can_cleanup,
            colour: None,
            session,
        })
    }

    pub fn is_dead(&self) -> bool {
        self.session.is_dead()
    }

    pub async fn send_command(&self, command: &str) -> Vec<String> {
        self.session.send_command(command).await
    }

    pub async fn send_command_timeout(
        &self,
        command: &str,
        timeout: std::time::Duration,
    ) -> Vec<String> {
        self.session.send_command_timeout(command, timeout).await
    }
}

fn strip_reply(lines: &[String]) -> String {
    lines
        .first()
        .and_then(|l| l.strip_prefix("= "))
        .unwrap_or("")
        .to_string()
}
