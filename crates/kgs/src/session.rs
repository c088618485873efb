use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use serde_json::{json, Value};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::KgsError;
use crate::sgf::SgfGame;

/// A predicate over an inbound message, used to correlate a `POST` with the
/// reply the server eventually pushes over the long-poll `GET` stream.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

const POST_TIMEOUT: Duration = Duration::from_secs(20);
const WAIT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Default)]
struct QueueState {
    pending: Vec<Predicate>,
    inbox: Vec<Value>,
    rooms: HashMap<i64, String>,
    channels: HashSet<i64>,
    games: HashMap<i64, SgfGame>,
}

#[derive(Default)]
struct LogState {
    log_messages: u32,
    recent: Vec<Value>,
}

/// A long-poll JSON session against a KGS-style server: one cookie-jar
/// client, a dedicated receive task issuing long-poll `GET`s, and the
/// request/response correlation machinery described in the match engine's
/// design notes (predicate registry + bounded recent-message log + a single
/// "something happened" signal).
///
/// The receive task is the sole mutator of `rooms`/`channels`/`games`/
/// `inbox`/`pending` (all guarded by `queue`) and of `recent`/`log_messages`
/// (guarded by `log`); `queue` is always locked before `log` when both are
/// needed.
pub struct KgsSession {
    client: Client,
    api: Url,
    queue: Mutex<QueueState>,
    log: Mutex<LogState>,
    feed: Notify,
    terminated: AtomicBool,
    receive_task: Mutex<Option<JoinHandle<()>>>,
}

impl KgsSession {
    pub async fn connect(api: &str, login: &str, password: &str) -> Result<Arc<Self>, KgsError> {
        let url = Url::parse(api).map_err(|_| KgsError::InvalidUrl(api.to_string()))?;
        let client = Client::builder().cookie_store(true).build()?;

        let session = Arc::new(KgsSession {
            client,
            api: url,
            queue: Mutex::new(QueueState::default()),
            log: Mutex::new(LogState::default()),
            feed: Notify::new(),
            terminated: AtomicBool::new(false),
            receive_task: Mutex::new(None),
        });

        let loop_session = session.clone();
        let handle = tokio::spawn(async move { loop_session.receive_loop().await });
        *session.receive_task.lock().await = Some(handle);

        let login_msg = json!({
            "type": "LOGIN",
            "name": login,
            "password": password,
            "locale": "en_US",
        });
        let is_success: Predicate =
            Arc::new(|m: &Value| msg_type(m) == "LOGIN_SUCCESS");
        if session.send_and_wait(login_msg, is_success).await.is_none() {
            return Err(KgsError::SignInFailed);
        }
        Ok(session)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Post `LOGOUT` and wait for the receive task to exit, mirroring
    /// `KgsClient.terminate`.
    pub async fn terminate(&self) {
        let _ = self.send_request(&json!({"type": "LOGOUT"})).await;
        if let Some(handle) = self.receive_task.lock().await.take() {
            let _ = handle.await;
        }
    }

    pub async fn send_message(&self, channel_id: i64, text: &str) {
        let _ = self
            .send_request(&json!({"type": "CHAT", "channelId": channel_id, "text": text}))
            .await;
    }

    pub async fn save_game(&self, channel_id: i64) {
        let _ = self
            .send_request(
                &json!({"type": "GAME_LIST_ENTRY_SET_FLAGS", "channelId": channel_id, "saved": true}),
            )
            .await;
    }

    pub async fn channel_id_by_room_name(&self, room_name: &str) -> Option<i64> {
        let q = self.queue.lock().await;
        q.rooms
            .iter()
            .find(|(_, name)| name.as_str() == room_name)
            .map(|(id, _)| *id)
    }

    pub(crate) async fn with_game<T>(&self, channel_id: i64, f: impl FnOnce(&SgfGame) -> T) -> Option<T> {
        let q = self.queue.lock().await;
        q.games.get(&channel_id).map(f)
    }

    pub(crate) async fn send_request(&self, msg: &Value) -> Option<String> {
        if self.is_terminated() {
            return None;
        }
        debug!(?msg, "kgs: send request");
        let resp = self
            .client
            .post(self.api.clone())
            .timeout(POST_TIMEOUT)
            .json(msg)
            .send()
            .await
            .ok()?;
        resp.text().await.ok()
    }

    pub(crate) async fn send_and_wait(&self, msg: Value, predicate: Predicate) -> Option<Value> {
        if self.is_terminated() {
            return None;
        }
        self.start_wait().await;
        let reply = self.send_request(&msg).await;
        if reply.as_deref() != Some("OK") {
            self.cancel_wait().await;
            return None;
        }
        self.end_wait(predicate).await
    }

    pub(crate) async fn start_wait(&self) {
        let mut log = self.log.lock().await;
        log.log_messages += 1;
    }

    pub(crate) async fn cancel_wait(&self) {
        let mut log = self.log.lock().await;
        log.log_messages = log.log_messages.saturating_sub(1);
        if log.log_messages == 0 {
            log.recent.clear();
        }
    }

    pub(crate) async fn end_wait(&self, predicate: Predicate) -> Option<Value> {
        if self.is_terminated() {
            return None;
        }
        {
            let mut q = self.queue.lock().await;
            q.pending.push(predicate.clone());
        }

        let mut found = {
            let mut log = self.log.lock().await;
            log.log_messages = log.log_messages.saturating_sub(1);
            let idx = log.recent.iter().position(|m| predicate(m));
            let found = idx.map(|i| log.recent.remove(i));
            if log.log_messages == 0 {
                log.recent.clear();
            }
            found
        };

        if found.is_none() {
            let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
            loop {
                if self.is_terminated() {
                    break;
                }
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                if remaining.is_zero() {
                    break;
                }
                let notified = self.feed.notified();
                {
                    let mut q = self.queue.lock().await;
                    if let Some(idx) = q.inbox.iter().position(|m| predicate(m)) {
                        found = Some(q.inbox.remove(idx));
                    }
                }
                if found.is_some() {
                    break;
                }
                let _ = tokio::time::timeout(remaining, notified).await;
            }
        }

        let mut q = self.queue.lock().await;
        q.pending.retain(|p| !Arc::ptr_eq(p, &predicate));
        found
    }

    async fn receive_loop(self: Arc<Self>) {
        loop {
            if self.is_terminated() {
                break;
            }
            match self.client.get(self.api.clone()).send().await {
                Ok(resp) if resp.status().is_success() => {
                    if let Ok(body) = resp.json::<Value>().await {
                        if let Some(messages) = body.get("messages").and_then(Value::as_array) {
                            for m in messages.clone() {
                                self.process_message(m).await;
                            }
                        }
                    }
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), "kgs: non-200 on long-poll, treating as LOGOUT");
                    self.process_message(json!({"type": "LOGOUT"})).await;
                }
                Err(e) => {
                    warn!(error = %e, "kgs: long-poll GET failed, treating as LOGOUT");
                    self.process_message(json!({"type": "LOGOUT"})).await;
                }
            }
        }
    }

    async fn process_message(&self, msg: Value) {
        let kind = msg_type(&msg).to_string();
        let mut to_send = None;
        let mut woke = false;

        {
            let mut q = self.queue.lock().await;
            if let Some(idx) = q.pending.iter().position(|p| p(&msg)) {
                q.pending.remove(idx);
                q.inbox.push(msg.clone());
                woke = true;
            }

            match kind.as_str() {
                "LOGOUT" => {
                    self.terminated.store(true, Ordering::SeqCst);
                    q.pending.clear();
                    woke = true;
                }
                "IDLE_WARNING" => {
                    to_send = Some(json!({"type": "WAKE_UP"}));
                }
                "ROOM_NAMES" => {
                    if let Some(rooms) = msg.get("rooms").and_then(Value::as_array) {
                        for room in rooms {
                            if let (Some(id), Some(name)) = (
                                room.get("channelId").and_then(Value::as_i64),
                                room.get("name").and_then(Value::as_str),
                            ) {
                                q.rooms.insert(id, name.to_string());
                            }
                        }
                    }
                }
                "GAME_JOIN" => {
                    if let Some(channel_id) = msg.get("channelId").and_then(Value::as_i64) {
                        let mut game = SgfGame::new();
                        if let Some(events) = msg.get("sgfEvents").and_then(Value::as_array) {
                            for e in events {
                                game.apply_event(e);
                            }
                        }
                        q.games.insert(channel_id, game);
                    }
                }
                "GAME_UPDATE" => {
                    if let Some(channel_id) = msg.get("channelId").and_then(Value::as_i64) {
                        if let Some(game) = q.games.get_mut(&channel_id) {
                            if let Some(events) = msg.get("sgfEvents").and_then(Value::as_array) {
                                for e in events {
                                    game.apply_event(e);
                                }
                            }
                        }
                    }
                }
                "JOIN_COMPLETE" => {
                    if let Some(channel_id) = msg.get("channelId").and_then(Value::as_i64) {
                        q.channels.insert(channel_id);
                    }
                }
                "UNJOIN" => {
                    if let Some(channel_id) = msg.get("channelId").and_then(Value::as_i64) {
                        q.channels.remove(&channel_id);
                    }
                }
                _ => {}
            }
        }

        if woke {
            self.feed.notify_waiters();
        }
        if let Some(out) = to_send {
            let _ = self.send_request(&out).await;
        }
        let mut log = self.log.lock().await;
        if log.log_messages > 0 {
            log.recent.push(msg);
        }
    }
}

fn msg_type(msg: &Value) -> &str {
    msg.get("type").and_then(Value::as_str).unwrap_or("")
}
