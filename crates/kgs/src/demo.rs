use std::sync::Arc;

use serde_json::{json, Value};

use crate::session::{KgsSession, Predicate};
use crate::sgf::gtp_to_loc;

fn msg_type(msg: &Value) -> &str {
    msg.get("type").and_then(Value::as_str).unwrap_or("")
}

fn has_activated(events: &Value, node_id: i64) -> bool {
    events
        .as_array()
        .is_some_and(|events| {
            events.iter().any(|e| {
                e.get("type").and_then(Value::as_str) == Some("ACTIVATED")
                    && e.get("nodeId").and_then(Value::as_i64) == Some(node_id)
            })
        })
}

impl KgsSession {
    /// Create an owned demonstration game in `room_channel_id`. Mirrors
    /// `KgsClient.createDemo`'s double `startWait`/`endWait` bracketing,
    /// which keeps the recent-message log alive across both the
    /// `GAME_NOTIFY` wait and the following `GAME_JOIN` wait.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_demo(
        &self,
        room_channel_id: i64,
        board_size: i64,
        komi: f64,
        time_system: &str,
        main_time: f64,
        byoyomi_time: f64,
        byoyomi_stones: i64,
        owner_login: &str,
    ) -> Option<i64> {
        self.start_wait().await;
        self.start_wait().await;

        let msg = json!({
            "type": "CHALLENGE_CREATE",
            "channelId": room_channel_id,
            "callbackKey": 0,
            "global": false,
            "text": "",
            "proposal": {
                "gameType": "demonstration",
                "nigiri": false,
                "rules": {
                    "rules": "chinese",
                    "size": board_size,
                    "komi": komi,
                    "timeSystem": time_system,
                    "mainTime": main_time,
                    "byoYomiTime": byoyomi_time,
                    "byoYomiStones": byoyomi_stones,
                },
                "players": [{"role": "owner", "name": owner_login}],
            },
        });

        let reply = self.send_request(&msg).await;
        if reply.as_deref() != Some("OK") {
            self.cancel_wait().await;
            self.cancel_wait().await;
            return None;
        }

        let is_notify: Predicate = Arc::new(|m: &Value| msg_type(m) == "GAME_NOTIFY");
        let Some(notify) = self.end_wait(is_notify).await else {
            self.cancel_wait().await;
            return None;
        };

        let game_id = notify.get("game")?.get("channelId")?.as_i64()?;
        let is_join: Predicate = Arc::new(move |m: &Value| {
            msg_type(m) == "GAME_JOIN" && m.get("channelId").and_then(Value::as_i64) == Some(game_id)
        });
        self.end_wait(is_join).await?;
        Some(game_id)
    }

    pub async fn demo_set_info(
        &self,
        channel_id: i64,
        player_white: &str,
        player_black: &str,
        place: &str,
        game_name: &str,
    ) {
        let msg = json!({
            "type": "KGS_SGF_CHANGE",
            "channelId": channel_id,
            "sgfEvents": [{
                "type": "PROP_GROUP_ADDED",
                "nodeId": 0,
                "props": [
                    {"name": "PLAYERNAME", "color": "white", "text": player_white},
                    {"name": "PLAYERNAME", "color": "black", "text": player_black},
                    {"name": "PLACE", "text": place},
                    {"name": "GAMENAME", "text": game_name},
                ],
            }],
        });
        let _ = self.send_request(&msg).await;
    }

    /// Play `place` (a GTP coordinate, or "pass") as `colour` in the demo
    /// mirror, waiting for the server to echo the activation of the new
    /// node.
    pub async fn demo_play_move(&self, channel_id: i64, colour: &str, place: &str) -> Option<()> {
        let loc = gtp_to_loc(place)?;
        let new_node = self.with_game(channel_id, |g| g.next_node_id()).await?;
        let active_node = self.with_game(channel_id, |g| g.active_node).await?;

        let msg = json!({
            "type": "KGS_SGF_CHANGE",
            "channelId": channel_id,
            "sgfEvents": [
                {"type": "CHILD_ADDED", "nodeId": active_node, "childNodeId": new_node},
                {"type": "PROP_ADDED", "nodeId": new_node, "prop": {"name": "MOVE", "loc": loc, "color": colour}},
                {"type": "ACTIVATED", "nodeId": new_node, "prevNodeId": -1},
            ],
        });

        let predicate: Predicate = Arc::new(move |m: &Value| {
            msg_type(m) == "GAME_UPDATE"
                && m.get("channelId").and_then(Value::as_i64) == Some(channel_id)
                && has_activated(&m["sgfEvents"], new_node)
        });
        self.send_and_wait(msg, predicate).await.map(|_| ())
    }

    /// Walk from the root following first-position children `move_num`
    /// times and activate the resulting node.
    pub async fn demo_jump_to_move(&self, channel_id: i64, move_num: u32) -> Option<()> {
        let target = self
            .with_game(channel_id, |game| {
                let mut cur = 0i64;
                for _ in 0..move_num {
                    let next = game
                        .nodes
                        .values()
                        .filter(|n| n.parent_node == cur)
                        .min_by_key(|n| n.position)
                        .map(|n| n.node_id);
                    match next {
                        Some(n) => cur = n,
                        None => break,
                    }
                }
                cur
            })
            .await?;
        let active = self.with_game(channel_id, |g| g.active_node).await?;
        if target == active {
            return Some(());
        }

        let msg = json!({
            "type": "KGS_SGF_CHANGE",
            "channelId": channel_id,
            "sgfEvents": [{"type": "ACTIVATED", "nodeId": target, "prevNodeId": -1}],
        });
        let predicate: Predicate = Arc::new(move |m: &Value| {
            msg_type(m) == "GAME_UPDATE"
                && m.get("channelId").and_then(Value::as_i64) == Some(channel_id)
                && has_activated(&m["sgfEvents"], target)
        });
        self.send_and_wait(msg, predicate).await.map(|_| ())
    }

    pub async fn demo_time_left(&self, channel_id: i64, colour: &str, main_time: f64, byoyomi_stones: i64) {
        let Some(active_node) = self.with_game(channel_id, |g| g.active_node).await else {
            return;
        };
        let msg = json!({
            "type": "KGS_SGF_CHANGE",
            "channelId": channel_id,
            "sgfEvents": [{
                "type": "PROP_ADDED",
                "nodeId": active_node,
                "prop": {"name": "TIMELEFT", "color": colour, "float": main_time, "int": byoyomi_stones},
            }],
        });
        let _ = self.send_request(&msg).await;
    }

    pub async fn demo_set_result(&self, channel_id: i64, result: &str) {
        let msg = json!({
            "type": "KGS_SGF_CHANGE",
            "channelId": channel_id,
            "sgfEvents": [{
                "type": "PROP_ADDED",
                "nodeId": 0,
                "prop": {"name": "RESULT", "text": result},
            }],
        });
        let _ = self.send_request(&msg).await;
    }
}
