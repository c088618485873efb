//! Bridges a local GTP engine subprocess to a remote tournament server: runs
//! a configured list of setup commands against the engine synchronously,
//! then relays GTP traffic bidirectionally over a TCP connection until
//! either side closes.

use std::path::PathBuf;
use std::process::Stdio;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "vpgtpc")]
#[command(about = "Bridge a local GTP engine to a tourneyd connection")]
struct Args {
    /// Path to the client ini file
    config: PathBuf,
}

struct Config {
    host: String,
    port: u16,
    cmd: String,
    commands: Vec<String>,
}

fn load_config(path: &PathBuf) -> Result<Config, std::io::Error> {
    let text = std::fs::read_to_string(path)?;
    let mut section = String::new();
    let mut host = String::new();
    let mut port = 0u16;
    let mut cmd = String::new();
    let mut commands = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.to_string();
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match section.as_str() {
            "Client" => match key.trim() {
                "Host" => host = value.to_string(),
                "Port" => port = value.parse().unwrap_or(0),
                "Cmd" => cmd = value.to_string(),
                _ => {}
            },
            "Commands" => commands.push(value.to_string()),
            _ => {}
        }
    }

    Ok(Config { host, port, cmd, commands })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_config(&args.config)?;

    let mut parts = config.cmd.split_whitespace();
    let program = parts.next().ok_or("empty engine command")?;
    let mut child = Command::new(program)
        .args(parts)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut child_stdin = child.stdin.take().ok_or("engine stdin unavailable")?;
    let child_stdout = child.stdout.take().ok_or("engine stdout unavailable")?;
    let mut child_stdout = BufReader::new(child_stdout);

    for command in &config.commands {
        child_stdin.write_all(format!("{command}\n").as_bytes()).await?;
        child_stdin.flush().await?;
        loop {
            let mut line = String::new();
            let n = child_stdout.read_line(&mut line).await?;
            if n == 0 || line.trim_end().is_empty() {
                break;
            }
            print!("{line}");
        }
    }

    let socket = TcpStream::connect((config.host.as_str(), config.port)).await?;
    let (sock_read, mut sock_write) = tokio::io::split(socket);
    let mut sock_read = BufReader::new(sock_read);

    let sock_to_app = async move {
        loop {
            let mut line = String::new();
            match sock_read.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    print!("{line}");
                    if child_stdin.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                    if child_stdin.flush().await.is_err() {
                        break;
                    }
                }
            }
        }
    };

    let app_to_sock = async move {
        loop {
            let mut line = String::new();
            match child_stdout.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    print!("{line}");
                    if sock_write.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                    if sock_write.flush().await.is_err() {
                        break;
                    }
                }
            }
        }
    };

    tokio::select! {
        _ = sock_to_app => {}
        _ = app_to_sock => {}
    }

    let _ = child.kill().await;
    Ok(())
}
