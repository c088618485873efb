use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One SGF property: a name plus optional color/location/value payload.
/// Modeled loosely (all payload fields optional) because KGS attaches a
/// different subset per property name (MOVE carries `loc`+`color`,
/// PLAYERNAME carries `color`+`text`, TIMELEFT carries `color`+`float`+`int`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgfProp {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "int", skip_serializing_if = "Option::is_none")]
    pub int_value: Option<i64>,
    #[serde(rename = "float", skip_serializing_if = "Option::is_none")]
    pub float_value: Option<f64>,
}

impl SgfProp {
    pub fn matches(&self, other: &SgfProp) -> bool {
        self.name == other.name
            && other.color.as_ref().map_or(true, |c| Some(c) == self.color.as_ref())
            && other.loc.as_ref().map_or(true, |l| Some(l) == self.loc.as_ref())
    }
}

#[derive(Debug, Clone)]
pub struct SgfNode {
    pub node_id: i64,
    pub parent_node: i64,
    pub position: i64,
    pub props: Vec<SgfProp>,
}

/// Mirror-only tree of SGF nodes, arena-style (`HashMap<nodeId, SgfNode>`,
/// no cyclic references). Authoritative state lives on the KGS server; this
/// is rebuilt incrementally from `sgfEvents`.
#[derive(Debug, Clone)]
pub struct SgfGame {
    pub nodes: HashMap<i64, SgfNode>,
    pub active_node: i64,
}

impl Default for SgfGame {
    fn default() -> Self {
        Self::new()
    }
}

impl SgfGame {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            0,
            SgfNode {
                node_id: 0,
                parent_node: -1,
                position: 0,
                props: Vec::new(),
            },
        );
        SgfGame {
            nodes,
            active_node: 0,
        }
    }

    pub fn next_node_id(&self) -> i64 {
        self.nodes.keys().copied().max().unwrap_or(0) + 1
    }

    /// Apply one raw `sgfEvents` element, per `parseSgfEvent`.
    pub fn apply_event(&mut self, event: &Value) {
        let Some(event_type) = event.get("type").and_then(Value::as_str) else {
            return;
        };
        let Some(node_id) = event.get("nodeId").and_then(Value::as_i64) else {
            return;
        };

        match event_type {
            "CHILD_ADDED" => {
                let Some(child_id) = child_node_id(event) else {
                    return;
                };
                let position = event.get("position").and_then(Value::as_i64).unwrap_or(0);
                self.nodes.insert(
                    child_id,
                    SgfNode {
                        node_id: child_id,
                        parent_node: node_id,
                        position,
                        props: Vec::new(),
                    },
                );
            }
            "CHILDREN_REORDERED" => {
                if let Some(children) = event.get("children").and_then(Value::as_array) {
                    for (pos, child) in children.iter().enumerate() {
                        if let Some(id) = child.as_i64() {
                            if let Some(node) = self.nodes.get_mut(&id) {
                                node.position = pos as i64;
                            }
                        }
                    }
                }
            }
            "ACTIVATED" => {
                self.active_node = node_id;
            }
            "PROP_ADDED" | "PROP_CHANGED" => {
                if let Some(prop) = event.get("prop").and_then(|p| parse_prop(p)) {
                    if let Some(node) = self.nodes.get_mut(&node_id) {
                        add_or_replace_prop(&mut node.props, prop);
                    }
                }
            }
            "PROP_REMOVED" => {
                if let Some(prop) = event.get("prop").and_then(|p| parse_prop(p)) {
                    if let Some(node) = self.nodes.get_mut(&node_id) {
                        remove_matching_prop(&mut node.props, &prop);
                    }
                }
            }
            "PROP_GROUP_ADDED" => {
                if let Some(props) = event.get("props").and_then(Value::as_array) {
                    if let Some(node) = self.nodes.get_mut(&node_id) {
                        for raw in props {
                            if let Some(prop) = parse_prop(raw) {
                                add_or_replace_prop(&mut node.props, prop);
                            }
                        }
                    }
                }
            }
            "PROP_GROUP_REMOVED" => {
                if let Some(props) = event.get("props").and_then(Value::as_array) {
                    if let Some(node) = self.nodes.get_mut(&node_id) {
                        for raw in props {
                            if let Some(prop) = parse_prop(raw) {
                                remove_matching_prop(&mut node.props, &prop);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

/// `CHILD_ADDED` payload uses `childNodeId` in most code paths but
/// `childNodeID` in `demoPlayMove`'s own authoring path; accept either on
/// ingest.
fn child_node_id(event: &Value) -> Option<i64> {
    event
        .get("childNodeId")
        .or_else(|| event.get("childNodeID"))
        .and_then(Value::as_i64)
}

fn parse_prop(v: &Value) -> Option<SgfProp> {
    serde_json::from_value(v.clone()).ok()
}

fn add_or_replace_prop(props: &mut Vec<SgfProp>, prop: SgfProp) {
    if let Some(idx) = props.iter().position(|p| p.matches(&prop)) {
        props.remove(idx);
    }
    props.push(prop);
}

fn remove_matching_prop(props: &mut Vec<SgfProp>, prop: &SgfProp) {
    if let Some(idx) = props.iter().position(|p| p.matches(prop)) {
        props.remove(idx);
    }
}

/// Translate a GTP coordinate (`"k10"`, `"K10"`, `"pass"`) into an SGF loc:
/// `"PASS"` or `{"x", "y"}`. The board is fixed at 19x19 and the column
/// letter `I` is skipped, per GTP convention.
pub fn gtp_to_loc(mv: &str) -> Option<Value> {
    if mv.eq_ignore_ascii_case("pass") {
        return Some(serde_json::json!("PASS"));
    }
    let lower = mv.to_ascii_lowercase();
    let mut chars = lower.chars();
    let col = chars.next()?;
    if !col.is_ascii_lowercase() {
        return None;
    }
    let row: i64 = chars.as_str().parse().ok()?;
    let mut x = (col as u8 - b'a') as i64;
    if x > 8 {
        x -= 1;
    }
    let y = 19 - row;
    Some(serde_json::json!({"x": x, "y": y}))
}

/// Inverse of [`gtp_to_loc`].
pub fn loc_to_gtp(loc: &Value) -> Option<String> {
    if loc.as_str() == Some("PASS") {
        return Some("pass".to_string());
    }
    let x = loc.get("x")?.as_i64()?;
    let y = loc.get("y")?.as_i64()?;
    let letter_index = if x >= 8 { x + 1 } else { x };
    let col = (b'a' + letter_index as u8) as char;
    let row = 19 - y;
    Some(format!("{col}{row}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_node_has_no_parent() {
        let game = SgfGame::new();
        assert_eq!(game.nodes.len(), 1);
        assert_eq!(game.nodes[&0].parent_node, -1);
        assert_eq!(game.active_node, 0);
    }

    #[test]
    fn child_added_and_activated() {
        let mut game = SgfGame::new();
        game.apply_event(&serde_json::json!({
            "type": "CHILD_ADDED", "nodeId": 0, "childNodeId": 1
        }));
        assert_eq!(game.nodes[&1].parent_node, 0);
        game.apply_event(&serde_json::json!({"type": "ACTIVATED", "nodeId": 1}));
        assert_eq!(game.active_node, 1);
    }

    #[test]
    fn child_added_accepts_capitalized_id_spelling() {
        let mut game = SgfGame::new();
        game.apply_event(&serde_json::json!({
            "type": "CHILD_ADDED", "nodeId": 0, "childNodeID": 7
        }));
        assert!(game.nodes.contains_key(&7));
    }

    #[test]
    fn prop_added_then_changed_replaces() {
        let mut game = SgfGame::new();
        game.apply_event(&serde_json::json!({
            "type": "PROP_ADDED", "nodeId": 0,
            "prop": {"name": "PLAYERNAME", "color": "black", "text": "alice"}
        }));
        game.apply_event(&serde_json::json!({
            "type": "PROP_CHANGED", "nodeId": 0,
            "prop": {"name": "PLAYERNAME", "color": "black", "text": "alice2"}
        }));
        let props = &game.nodes[&0].props;
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].text.as_deref(), Some("alice2"));
    }

    #[test]
    fn children_reordered_sets_positions() {
        let mut game = SgfGame::new();
        for id in [1, 2, 3] {
            game.apply_event(&serde_json::json!({
                "type": "CHILD_ADDED", "nodeId": 0, "childNodeId": id
            }));
        }
        game.apply_event(&serde_json::json!({
            "type": "CHILDREN_REORDERED", "nodeId": 0, "children": [3, 1, 2]
        }));
        assert_eq!(game.nodes[&3].position, 0);
        assert_eq!(game.nodes[&1].position, 1);
        assert_eq!(game.nodes[&2].position, 2);
    }

    #[test]
    fn coord_round_trip_identity_for_legal_points() {
        for row in 1..=19i64 {
            for col in 0u8..19 {
                let letter = if col < 8 { b'a' + col } else { b'a' + col + 1 } as char;
                let gtp = format!("{letter}{row}");
                let loc = gtp_to_loc(&gtp).unwrap();
                let back = loc_to_gtp(&loc).unwrap();
                assert_eq!(back, gtp);
            }
        }
    }

    #[test]
    fn coord_round_trip_identity_for_pass() {
        let loc = gtp_to_loc("pass").unwrap();
        assert_eq!(loc_to_gtp(&loc).unwrap(), "pass");
    }

    #[test]
    fn gtp_to_loc_skips_letter_i() {
        assert_eq!(gtp_to_loc("h10").unwrap()["x"], 7);
        assert_eq!(gtp_to_loc("j10").unwrap()["x"], 8);
    }
}
