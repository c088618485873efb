use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// 10 second bound used by `sendCommandWithTimeout` for ordinary player
/// commands (everything except `genmove`, which is bounded by the match's
/// remaining time budget instead).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// A line-framed GTP session over any full-duplex byte stream: an accepted
/// TCP socket (Player) or a spawned child process's stdio pipes (Referee).
///
/// Reads are driven by a background task that forwards decoded lines into a
/// channel; `send_command`/`send_command_timeout` serialize writes and the
/// matching read behind a single mutex, so exactly one command is ever in
/// flight. Once `dead`, every send is a no-op returning an empty response.
pub struct GtpSession {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
    send_lock: Mutex<()>,
    dead: Arc<AtomicBool>,
    reader_task: JoinHandle<()>,
}

impl GtpSession {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let dead = Arc::new(AtomicBool::new(false));
        let dead_for_reader = dead.clone();
        let reader_task = tokio::spawn(async move {
            use tokio::io::AsyncBufReadExt;
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.strip_suffix('\r').map(str::to_owned).unwrap_or(line);
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) | Err(_) => {
                        dead_for_reader.store(true, Ordering::SeqCst);
                        break;
                    }
                }
            }
        });

        GtpSession {
            writer: Mutex::new(Box::new(writer)),
            lines: Mutex::new(rx),
            send_lock: Mutex::new(()),
            dead,
            reader_task,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    async fn mark_dead(&self) {
        if !self.dead.swap(true, Ordering::SeqCst) {
            let mut w = self.writer.lock().await;
            let _ = w.shutdown().await;
        }
    }

    /// Send a command with no timeout. Used by the Referee, which is local
    /// and trusted.
    pub async fn send_command(&self, command: &str) -> Vec<String> {
        self.send_raw(command).await
    }

    /// Send a command bounded by `timeout`. On expiry the session is marked
    /// dead and the transport closed; the caller sees an empty response.
    pub async fn send_command_timeout(&self, command: &str, timeout: Duration) -> Vec<String> {
        if self.is_dead() {
            return Vec::new();
        }
        match tokio::time::timeout(timeout, self.send_raw(command)).await {
            Ok(lines) => lines,
            Err(_) => {
                self.mark_dead().await;
                Vec::new()
            }
        }
    }

    async fn send_raw(&self, command: &str) -> Vec<String> {
        if self.is_dead() {
            return Vec::new();
        }
        let _serialize = self.send_lock.lock().await;
        if self.is_dead() {
            return Vec::new();
        }

        {
            let mut w = self.writer.lock().await;
            let line = format!("{command}\n");
            if w.write_all(line.as_bytes()).await.is_err() || w.flush().await.is_err() {
                drop(w);
                self.mark_dead().await;
                return Vec::new();
            }
        }

        let mut rx = self.lines.lock().await;
        let mut out = Vec::new();
        loop {
            match rx.recv().await {
                Some(line) if line.is_empty() => break,
                Some(line) => out.push(line),
                None => {
                    self.mark_dead().await;
                    break;
                }
            }
        }
        normalize_first_line(&mut out);
        out
    }
}

impl Drop for GtpSession {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Rewrite a leading `=<digits> ` to `= ` on the first response line, per
/// the GTP response-id convention. Lines already in `= `/`?` form are left
/// untouched.
fn normalize_first_line(lines: &mut [String]) {
    let Some(first) = lines.first_mut() else {
        return;
    };
    let Some(rest) = first.strip_prefix('=') else {
        return;
    };
    let Some(space_idx) = rest.find(' ') else {
        return;
    };
    if !rest[..space_idx].chars().all(|c| c.is_ascii_digit()) {
        return;
    }
    *first = format!("= {}", &rest[space_idx + 1..]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncWriteExt as _};

    #[tokio::test]
    async fn normalizes_numbered_reply() {
        let (client_read, mut server_write) = duplex(4096);
        let (mut server_read, client_write) = duplex(4096);
        let session = GtpSession::new(client_read, client_write);

        let echo = tokio::spawn(async move {
            use tokio::io::{AsyncBufReadExt, AsyncReadExt};
            let mut buf = Vec::new();
            let mut reader = tokio::io::BufReader::new(&mut server_read);
            reader.read_until(b'\n', &mut buf).await.unwrap();
            server_write.write_all(b"=1 true\n\n").await.unwrap();
        });

        let lines = session.send_command("known_command play").await;
        echo.await.unwrap();
        assert_eq!(lines, vec!["= true".to_string()]);
    }

    #[tokio::test]
    async fn dies_on_timeout() {
        let (client_read, _server_write) = duplex(4096);
        let (_server_read, client_write) = duplex(4096);
        let session = GtpSession::new(client_read, client_write);

        let lines = session
            .send_command_timeout("genmove black", Duration::from_millis(20))
            .await;
        assert!(lines.is_empty());
        assert!(session.is_dead());
    }

    #[tokio::test]
    async fn dead_session_is_noop() {
        let (client_read, server_write) = duplex(4096);
        let (_server_read, client_write) = duplex(4096);
        let session = GtpSession::new(client_read, client_write);
        drop(server_write);

        // give the reader task a moment to observe EOF
        tokio::time::sleep(Duration::from_millis(20)).await;
        let lines = session.send_command("quit").await;
        assert!(lines.is_empty());
        assert!(session.is_dead());
    }

    #[test]
    fn normalize_strips_response_id() {
        let mut lines = vec!["=42 true".to_string(), "continuation".to_string()];
        normalize_first_line(&mut lines);
        assert_eq!(lines[0], "= true");
        assert_eq!(lines[1], "continuation");
    }

    #[test]
    fn normalize_leaves_plain_reply() {
        let mut lines = vec!["= true".to_string()];
        normalize_first_line(&mut lines);
        assert_eq!(lines[0], "= true");
    }

    #[test]
    fn normalize_leaves_failure_reply() {
        let mut lines = vec!["? unknown command".to_string()];
        normalize_first_line(&mut lines);
        assert_eq!(lines[0], "? unknown command");
    }
}
