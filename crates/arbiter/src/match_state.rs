use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Mutex, Notify};

use kgs::KgsSession;
use std::sync::Arc;

use crate::colour::Colour;
use crate::player::Player;
use crate::referee::Referee;
use crate::timer::{TimeLeft, Timer};

struct Inner {
    players: [Option<Player>; 2],
    timers: [Timer; 2],
    on_turn: Option<usize>,
    cleanup_mode: bool,
}

/// One tournament match: a referee, a KGS demo mirror, two timers, and the
/// two colour slots a connecting player attaches to. All mutable turn state
/// lives behind a single lock, mirroring the Python original's one
/// game-wide mutex held for essentially the whole turn loop.
pub struct MatchState {
    pub name: String,
    pub ids: [String; 2],
    pub names: [String; 2],
    referee: Mutex<Referee>,
    kgs: Option<Arc<KgsSession>>,
    kgs_channel: Option<i64>,
    inner: Mutex<Inner>,
    notify: [Notify; 2],
    result: Mutex<Option<String>>,
}

/// Randomly assigns black/white to the two declared participant ids,
/// returning `(ids, names)` reordered so index 0 is Black and index 1 is
/// White. Callers that need to know the colour assignment ahead of
/// constructing the `MatchState` itself (e.g. to label a KGS demo board)
/// must call this first and pass its result into `MatchState::new`, so the
/// coin flip happens exactly once and both sides agree on it.
pub fn assign_colours(ids: [String; 2], names: [String; 2]) -> ([String; 2], [String; 2]) {
    let swap = rand::thread_rng().gen_bool(0.5);
    if swap {
        ([ids[1].clone(), ids[0].clone()], [names[1].clone(), names[0].clone()])
    } else {
        (ids, names)
    }
}

impl MatchState {
    /// `ids`/`names` must already be colour-resolved (index 0 Black, index 1
    /// White), as returned by `assign_colours`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        referee: Referee,
        kgs: Option<Arc<KgsSession>>,
        kgs_channel: Option<i64>,
        ids: [String; 2],
        names: [String; 2],
        main_time: f64,
        byoyomi_time: f64,
        byoyomi_moves: u32,
    ) -> Self {
        MatchState {
            name,
            ids,
            names,
            referee: Mutex::new(referee),
            kgs,
            kgs_channel,
            inner: Mutex::new(Inner {
                players: [None, None],
                timers: [
                    Timer::new(main_time, byoyomi_time, byoyomi_moves),
                    Timer::new(main_time, byoyomi_time, byoyomi_moves),
                ],
                on_turn: None,
                cleanup_mode: false,
            }),
            notify: [Notify::new(), Notify::new()],
            result: Mutex::new(None),
        }
    }

    pub fn colour_for_id(&self, id: &str) -> Option<Colour> {
        if self.ids[0] == id {
            Some(Colour::Black)
        } else if self.ids[1] == id {
            Some(Colour::White)
        } else {
            None
        }
    }

    pub fn is_finished(&self) -> bool {
        self.result.try_lock().map(|r| r.is_some()).unwrap_or(false)
    }

    pub async fn result(&self) -> Option<String> {
        self.result.lock().await.clone()
    }

    /// Attach a newly connected player to its colour slot: run setup
    /// commands, replay referee history, and report current time_left if
    /// the match is already under way. Returns the player back on failure
    /// (slot already occupied by a live connection) so the caller can close
    /// the duplicate socket.
    pub async fn attach_player(
        &self,
        mut player: Player,
        setup_commands: &[String],
    ) -> Result<(), Player> {
        let Some(colour) = self.colour_for_id(&player.id) else {
            return Err(player);
        };
        let mut inner = self.inner.lock().await;
        let idx = colour.index();
        if let Some(existing) = &inner.players[idx] {
            if !existing.is_dead() {
                return Err(player);
            }
        }

        for cmd in setup_commands {
            player
                .send_command_timeout(cmd, gtp::DEFAULT_COMMAND_TIMEOUT)
                .await;
        }
        player.colour = Some(colour);
        self.referee.lock().await.prepare_player(&player).await;

        if let (Some(kgs), Some(channel)) = (&self.kgs, self.kgs_channel) {
            kgs.send_message(channel, &format!("Joined: {}", player.name)).await;
        }

        if let Some(on_turn) = inner.on_turn {
            for (i, timer) in inner.timers.iter().enumerate() {
                let tl = if i == on_turn {
                    timer.current_time()
                } else {
                    timer.last_time()
                };
                player
                    .send_command_timeout(&time_left_command(i, tl), gtp::DEFAULT_COMMAND_TIMEOUT)
                    .await;
            }
        }

        inner.players[idx] = Some(player);
        self.notify[idx].notify_waiters();
        Ok(())
    }

    /// The full turn loop: alternates genmove/time bookkeeping between the
    /// two colours until a resignation, time loss, forfeit, or scoring
    /// agreement ends the match.
    pub async fn run(&self) {
        if let (Some(kgs), Some(channel)) = (&self.kgs, self.kgs_channel) {
            for idx in 0..2 {
                kgs.send_message(
                    channel,
                    &format!("{}: id {} - {}", self.names[idx], self.ids[idx], Colour::from_index(idx).to_gtp_str()),
                )
                .await;
            }
            let referee_name = self.referee.lock().await.name.clone();
            kgs.send_message(channel, &format!("Referee: {referee_name}")).await;
        }

        let mut inner = self.inner.lock().await;
        inner.on_turn = Some(0);
        self.broadcast_initial_time(&inner).await;

        loop {
            let colour_idx = inner.on_turn.unwrap();
            let deadline = match inner.timers[colour_idx].start_move() {
                Some(secs) => gtp::Deadline::after(Duration::from_secs(secs)),
                None => gtp::Deadline::none(),
            };
            let mv;

            loop {
                let connected = inner.players[colour_idx]
                    .as_ref()
                    .map(|p| !p.is_dead())
                    .unwrap_or(false);

                if !connected {
                    drop(inner);
                    match deadline.remaining() {
                        Some(d) => {
                            let _ = tokio::time::timeout(d, self.notify[colour_idx].notified()).await;
                        }
                        None => self.notify[colour_idx].notified().await,
                    }
                    inner = self.inner.lock().await;
                    continue;
                }

                let cleanup = inner.cleanup_mode
                    && inner.players[colour_idx]
                        .as_ref()
                        .map(|p| p.can_cleanup)
                        .unwrap_or(false);
                let gtp_colour = Colour::from_index(colour_idx).to_gtp_str();
                let cmd = if cleanup {
                    format!("kgs-genmove_cleanup {gtp_colour}")
                } else {
                    format!("genmove {gtp_colour}")
                };
                let player = inner.players[colour_idx].as_ref().unwrap();
                let reply_result = match deadline.remaining() {
                    Some(budget) => tokio::time::timeout(budget, player.send_command(&cmd)).await,
                    None => Ok(player.send_command(&cmd).await),
                };

                match reply_result {
                    // The engine answered, or its socket died, before the
                    // clock ran out. A dead-engine reply is empty; since
                    // there was time left, this is a fresh disconnect, not
                    // a time loss, so go back around and wait for it to
                    // reconnect rather than resolving this round.
                    Ok(reply) if reply.is_empty() => continue,
                    // Whatever came back becomes the move, success or
                    // failure, matching a GTP engine's raw reply slice
                    // rather than re-parsing for a `"= "` prefix.
                    Ok(reply) => {
                        mv = reply[0].get(2..).unwrap_or("").trim().to_ascii_lowercase();
                        break;
                    }
                    // Genuinely too slow: resolve this round via whatever
                    // the lostOnTime/forfeit checks below decide, rather
                    // than retrying.
                    Err(_) => {
                        mv = String::new();
                        break;
                    }
                }
            }

            let time_left = inner.timers[colour_idx].end_move();
            self.broadcast_time_left(&inner, colour_idx, time_left).await;

            if mv == "resign" {
                let result = format!("{}+Resign", capitalized(Colour::from_index(colour_idx).opposite()));
                self.finish_with_result(&mut inner, result).await;
                break;
            }
            if inner.timers[colour_idx].lost_on_time() {
                let result = format!("{}+Time", capitalized(Colour::from_index(colour_idx).opposite()));
                self.finish_with_result(&mut inner, result).await;
                break;
            }
            if !self.attempt_move(&inner, colour_idx, &mv).await {
                if let (Some(kgs), Some(channel)) = (&self.kgs, self.kgs_channel) {
                    kgs.send_message(channel, &format!("Attempted move: {mv}")).await;
                }
                let result = format!("{}+Forfeit", capitalized(Colour::from_index(colour_idx).opposite()));
                self.finish_with_result(&mut inner, result).await;
                break;
            }

            if let Some(channel) = self.kgs_channel {
                if let Some(kgs) = &self.kgs {
                    kgs.demo_play_move(channel, gtp_colour_word(colour_idx), &mv).await;
                    kgs.demo_time_left(
                        channel,
                        gtp_colour_word(colour_idx),
                        time_left.seconds as f64,
                        time_left.stones as i64,
                    )
                    .await;
                }
            }

            let ended = self.referee.lock().await.game_ended().await;
            if ended && self.finish_game(&mut inner).await {
                break;
            }

            inner.on_turn = Some(colour_idx ^ 1);
        }

        drop(inner);
        if let (Some(kgs), Some(channel)) = (&self.kgs, self.kgs_channel) {
            let result = self.result.lock().await.clone().unwrap_or_default();
            kgs.send_message(channel, &format!("Game result: {result}")).await;
            kgs.save_game(channel).await;
            kgs.terminate().await;
        }
        self.referee.lock().await.quit().await;
    }

    async fn broadcast_initial_time(&self, inner: &Inner) {
        for idx in 0..2 {
            let tl = inner.timers[idx].last_time();
            self.broadcast_time_left(inner, idx, tl).await;
        }
    }

    /// Step (d)'s `time_left` broadcast to every attached player. The KGS
    /// mirror's own `demoTimeLeft` is sent separately, after `demoPlayMove`,
    /// only on a move that doesn't terminate the match (step e).
    async fn broadcast_time_left(&self, inner: &Inner, colour_idx: usize, tl: TimeLeft) {
        let cmd = time_left_command(colour_idx, tl);
        for slot in inner.players.iter().flatten() {
            slot.send_command_timeout(&cmd, gtp::DEFAULT_COMMAND_TIMEOUT).await;
        }
    }

    async fn attempt_move(&self, inner: &Inner, colour_idx: usize, mv: &str) -> bool {
        let gtp_colour = Colour::from_index(colour_idx).to_gtp_str();
        let reply = self
            .referee
            .lock()
            .await
            .send_command(&format!("play {gtp_colour} {mv}"))
            .await;
        if reply.first().map(|l| l.starts_with("= ")) != Some(true) {
            return false;
        }
        for (idx, slot) in inner.players.iter().enumerate() {
            if idx == colour_idx {
                continue;
            }
            if let Some(p) = slot {
                p.send_command_timeout(&format!("play {gtp_colour} {mv}"), gtp::DEFAULT_COMMAND_TIMEOUT)
                    .await;
            }
        }
        true
    }

    /// Returns true once the match has actually ended (scores agree, or an
    /// entrant is missing). Returns false when play should resume because
    /// the two players disagree on which stones are dead.
    async fn finish_game(&self, inner: &mut Inner) -> bool {
        for slot in inner.players.iter_mut() {
            if slot.as_ref().map(|p| p.is_dead()).unwrap_or(false) {
                *slot = None;
            }
        }
        let attached: Vec<usize> = (0..2).filter(|&i| inner.players[i].is_some()).collect();

        if attached.len() == 2 {
            let mut dead_sets = [HashSet::new(), HashSet::new()];
            for &idx in &attached {
                let reply = inner.players[idx]
                    .as_ref()
                    .unwrap()
                    .send_command("final_status_list dead")
                    .await;
                dead_sets[idx] = parse_stone_set(&reply);
            }
            if dead_sets[0] != dead_sets[1] {
                inner.cleanup_mode = true;
                return false;
            }
        }

        let mut scores = Vec::new();
        for &idx in &attached {
            let reply = inner.players[idx].as_ref().unwrap().send_command("final_score").await;
            if let Some(line) = reply.first().and_then(|l| l.strip_prefix("= ")) {
                scores.push(line.trim().to_ascii_uppercase());
            }
        }
        let referee_reply = self.referee.lock().await.send_command("final_score").await;
        let referee_score = referee_reply
            .first()
            .and_then(|l| l.strip_prefix("= "))
            .unwrap_or("")
            .trim()
            .to_ascii_uppercase();

        let result = if !referee_score.is_empty() && scores.iter().all(|s| s == &referee_score) {
            self.mirror_result(&referee_score).await;
            referee_score
        } else if scores.len() == 2 && scores[0] == scores[1] {
            format!("players: {}, referee: {}", scores[0], referee_score)
        } else {
            format!("players do not agree, referee: {referee_score}")
        };

        *self.result.lock().await = Some(result);
        true
    }

    async fn finish_with_result(&self, inner: &mut Inner, result: String) {
        self.mirror_result(&result).await;
        *self.result.lock().await = Some(result);
        for slot in inner.players.iter_mut() {
            *slot = None;
        }
    }

    async fn mirror_result(&self, result: &str) {
        if let (Some(kgs), Some(channel)) = (&self.kgs, self.kgs_channel) {
            kgs.demo_set_result(channel, result).await;
        }
    }
}

fn time_left_command(colour_idx: usize, tl: TimeLeft) -> String {
    format!(
        "time_left {} {} {}",
        Colour::from_index(colour_idx).to_gtp_str(),
        tl.seconds,
        tl.stones
    )
}

fn gtp_colour_word(colour_idx: usize) -> &'static str {
    Colour::from_index(colour_idx).to_gtp_str()
}

/// First letter of the colour's GTP word, uppercased: the initial GTP
/// result strings use (`"B+Resign"`, `"W+Time"`).
fn capitalized(colour: Colour) -> &'static str {
    match colour {
        Colour::Black => "B",
        Colour::White => "W",
    }
}

fn parse_stone_set(reply: &[String]) -> HashSet<String> {
    reply
        .first()
        .and_then(|l| l.strip_prefix("= "))
        .unwrap_or("")
        .split_whitespace()
        .map(|s| s.to_ascii_lowercase())
        .collect()
}
