use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::{Duration, SystemTime};

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    MissingSection(String),
    MissingKey { section: String, key: String },
    InvalidInt { key: String, value: String },
    InvalidFloat { key: String, value: String },
    InvalidRoundStart(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "reading tournament config: {e}"),
            ConfigError::MissingSection(s) => write!(f, "missing section [{s}]"),
            ConfigError::MissingKey { section, key } => {
                write!(f, "missing key {key} in section [{section}]")
            }
            ConfigError::InvalidInt { key, value } => {
                write!(f, "key {key} has non-integer value {value:?}")
            }
            ConfigError::InvalidFloat { key, value } => {
                write!(f, "key {key} has non-numeric value {value:?}")
            }
            ConfigError::InvalidRoundStart(v) => {
                write!(f, "RoundStart {v:?} is not in DD.MM.YYYY HH:MM form")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    pub id: String,
    pub kgs_room: String,
    pub kgs_name: String,
    pub kgs_password: String,
    pub player1: String,
    pub player2: String,
    pub player1_id: String,
    pub player2_id: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub referee_cmd: String,
    pub kgs_api: String,
    pub main_time: f64,
    pub byoyomi_time: f64,
    pub byoyomi_moves: u32,
    pub round_start: SystemTime,
    pub referee_setup_commands: Vec<String>,
    pub player_setup_commands: Vec<String>,
    pub games: Vec<GameConfig>,
}

/// A bare-bones ini reader: `[section]` headers, `key=value` lines, `;`/`#`
/// comments, blank lines ignored. No interpolation, no quoting — the
/// tournament files this reads are hand-written and small.
struct Ini {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl Ini {
    fn parse(text: &str) -> Ini {
        let mut sections: Vec<(String, Vec<(String, String)>)> = Vec::new();
        let mut current: Option<usize> = None;

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                sections.push((name.to_string(), Vec::new()));
                current = Some(sections.len() - 1);
                continue;
            }
            let Some(idx) = current else { continue };
            if let Some((key, value)) = line.split_once('=') {
                sections[idx]
                    .1
                    .push((key.trim().to_string(), value.trim().to_string()));
            }
        }

        Ini { sections }
    }

    fn section(&self, name: &str) -> Option<&[(String, String)]> {
        self.sections
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, kv)| kv.as_slice())
    }

    fn all_named<'a>(&'a self, prefix: &str) -> impl Iterator<Item = (&'a str, &'a [(String, String)])> {
        self.sections
            .iter()
            .filter(move |(n, _)| n.starts_with(prefix))
            .map(|(n, kv)| (n.as_str(), kv.as_slice()))
    }
}

fn require<'a>(kv: &'a [(String, String)], section: &str, key: &str) -> Result<&'a str, ConfigError> {
    kv.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .ok_or_else(|| ConfigError::MissingKey {
            section: section.to_string(),
            key: key.to_string(),
        })
}

fn parse_int(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidInt {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_float(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidFloat {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Parse `DD.MM.YYYY HH:MM` as a naive local timestamp, matching
/// `strptime("%d.%m.%Y %H:%M")` compared against the local clock with no
/// timezone conversion.
fn parse_round_start(value: &str) -> Result<SystemTime, ConfigError> {
    let bad = || ConfigError::InvalidRoundStart(value.to_string());
    let (date, time) = value.split_once(' ').ok_or_else(bad)?;
    let mut date_parts = date.split('.');
    let day: u64 = date_parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let month: u64 = date_parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let year: i64 = date_parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let mut time_parts = time.split(':');
    let hour: u64 = time_parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let minute: u64 = time_parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;

    let days = days_from_civil(year, month, day);
    let epoch_seconds = days * 86_400 + hour * 3_600 + minute * 60;
    Ok(SystemTime::UNIX_EPOCH + Duration::from_secs(epoch_seconds))
}

/// Howard Hinnant's `days_from_civil`, days since the Unix epoch for a
/// proleptic Gregorian calendar date. Assumes `year >= 1970`.
fn days_from_civil(year: i64, month: u64, day: u64) -> u64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y / 400;
    let yoe = (y - era * 400) as u64;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    (era as u64) * 146_097 + doe - 719_468
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let ini = Ini::parse(&text);

        let server = ini
            .section("Server")
            .ok_or_else(|| ConfigError::MissingSection("Server".to_string()))?;

        let host = require(server, "Server", "Host")?.to_string();
        let port: u16 = parse_int("Port", require(server, "Server", "Port")?)? as u16;
        let referee_cmd = require(server, "Server", "RefereeCmd")?.to_string();
        let kgs_api = require(server, "Server", "KgsApi")?.to_string();
        let main_time = parse_float("MainTime", require(server, "Server", "MainTime")?)?;
        let byoyomi_time = parse_float("ByoyomiTime", require(server, "Server", "ByoyomiTime")?)?;
        let byoyomi_moves = parse_int("ByoyomiMoves", require(server, "Server", "ByoyomiMoves")?)?;
        let round_start = parse_round_start(require(server, "Server", "RoundStart")?)?;

        let referee_setup_commands = ini
            .section("RefereeSetupCommands")
            .map(|kv| kv.iter().map(|(_, v)| v.clone()).collect())
            .unwrap_or_default();

        let mut player_setup_commands: Vec<String> = ini
            .section("PlayerSetupCommands")
            .map(|kv| kv.iter().map(|(_, v)| v.clone()).collect())
            .unwrap_or_default();
        player_setup_commands.push(format!(
            "time_settings {} {} {}",
            main_time as i64, byoyomi_time as i64, byoyomi_moves
        ));

        let mut games: Vec<GameConfig> = Vec::new();
        let mut by_id: HashMap<String, usize> = HashMap::new();
        for (section_name, kv) in ini.all_named("Game=") {
            let Some(id) = section_name.split_once('=').map(|(_, id)| id.to_string()) else {
                continue;
            };
            let game = GameConfig {
                id: id.clone(),
                kgs_room: require(kv, section_name, "KGSRoom")?.to_string(),
                kgs_name: require(kv, section_name, "KGSName")?.to_string(),
                kgs_password: require(kv, section_name, "KGSPassword")?.to_string(),
                player1: require(kv, section_name, "Player1")?.to_string(),
                player2: require(kv, section_name, "Player2")?.to_string(),
                player1_id: require(kv, section_name, "Player1ID")?.to_string(),
                player2_id: require(kv, section_name, "Player2ID")?.to_string(),
            };
            if let Some(&idx) = by_id.get(&id) {
                games[idx] = game;
            } else {
                by_id.insert(id, games.len());
                games.push(game);
            }
        }

        Ok(Config {
            host,
            port,
            referee_cmd,
            kgs_api,
            main_time,
            byoyomi_time,
            byoyomi_moves,
            round_start,
            referee_setup_commands,
            player_setup_commands,
            games,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_from_civil_matches_known_epoch() {
        assert_eq!(days_from_civil(1970, 1, 1), 0);
        assert_eq!(days_from_civil(2000, 3, 1), 11_017);
    }

    #[test]
    fn round_start_parses_dd_mm_yyyy() {
        let t = parse_round_start("01.01.1970 00:00").unwrap();
        assert_eq!(t, SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn repeated_game_section_overwrites_by_position() {
        let text = "\
[Game=1]
KGSRoom=lobby
KGSName=n
KGSPassword=p
Player1=a
Player2=b
Player1ID=a-id
Player2ID=b-id

[Game=2]
KGSRoom=lobby2
KGSName=n2
KGSPassword=p2
Player1=c
Player2=d
Player1ID=c-id
Player2ID=d-id

[Game=1]
KGSRoom=lobby3
KGSName=n3
KGSPassword=p3
Player1=e
Player2=f
Player1ID=e-id
Player2ID=f-id
";
        let ini = Ini::parse(text);
        let mut games: Vec<GameConfig> = Vec::new();
        let mut by_id: HashMap<String, usize> = HashMap::new();
        for (section_name, kv) in ini.all_named("Game=") {
            let id = section_name.split_once('=').unwrap().1.to_string();
            let game = GameConfig {
                id: id.clone(),
                kgs_room: require(kv, section_name, "KGSRoom").unwrap().to_string(),
                kgs_name: String::new(),
                kgs_password: String::new(),
                player1: String::new(),
                player2: String::new(),
                player1_id: String::new(),
                player2_id: String::new(),
            };
            if let Some(&idx) = by_id.get(&id) {
                games[idx] = game;
            } else {
                by_id.insert(id, games.len());
                games.push(game);
            }
        }
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].kgs_room, "lobby3");
        assert_eq!(games[1].kgs_room, "lobby2");
    }
}
