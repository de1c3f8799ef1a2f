use serde_json::{json, Value};

use crate::server_utils::sanitize_tilt;
use crate::types::{Coord, Direction, Snapshot};

#[derive(Debug, PartialEq)]
pub enum ParsedClientMessage {
    Start,
    Key { key: String },
    Move { dir: Direction },
    Click { target: Coord },
    Tilt { beta: f64, gamma: f64 },
    Continue,
    Restart,
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "start" => Some(ParsedClientMessage::Start),
        "key" => {
            let key = object.get("key")?.as_str()?.trim();
            if key.is_empty() {
                return None;
            }
            Some(ParsedClientMessage::Key {
                key: key.to_string(),
            })
        }
        "move" => {
            let dir = Direction::parse_move(object.get("dir")?.as_str()?)?;
            Some(ParsedClientMessage::Move { dir })
        }
        "click" => {
            let x = parse_cell_index(object.get("x")?)?;
            let y = parse_cell_index(object.get("y")?)?;
            Some(ParsedClientMessage::Click {
                target: Coord::new(x, y),
            })
        }
        "tilt" => {
            let beta = parse_tilt_axis(object.get("beta"))?;
            let gamma = parse_tilt_axis(object.get("gamma"))?;
            Some(ParsedClientMessage::Tilt { beta, gamma })
        }
        "continue" => Some(ParsedClientMessage::Continue),
        "restart" => Some(ParsedClientMessage::Restart),
        _ => None,
    }
}

pub fn state_message(snapshot: &Snapshot) -> Value {
    json!({
        "type": "state",
        "snapshot": snapshot,
    })
}

pub fn error_message(message: &str) -> Value {
    json!({
        "type": "error",
        "message": message,
    })
}

/// Cell indices arrive as JSON numbers; fractional values are floored the
/// way a pointer position maps onto a cell.
fn parse_cell_index(value: &Value) -> Option<i32> {
    if let Some(number) = value.as_i64() {
        return i32::try_from(number).ok();
    }
    let number = value.as_f64()?;
    if !number.is_finite() {
        return None;
    }
    let floored = number.floor();
    if floored < i32::MIN as f64 || floored > i32::MAX as f64 {
        return None;
    }
    Some(floored as i32)
}

/// A missing axis reads as level; a present but unusable one rejects the
/// whole message.
fn parse_tilt_axis(value: Option<&Value>) -> Option<f64> {
    match value {
        None | Some(Value::Null) => Some(0.0),
        Some(value) => sanitize_tilt(value.as_f64()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_commands() {
        assert_eq!(
            parse_client_message(r#"{"type":"start"}"#),
            Some(ParsedClientMessage::Start)
        );
        assert_eq!(
            parse_client_message(r#"{"type":"continue"}"#),
            Some(ParsedClientMessage::Continue)
        );
        assert_eq!(
            parse_client_message(r#"{"type":"restart","extra":1}"#),
            Some(ParsedClientMessage::Restart)
        );
    }

    #[test]
    fn parse_key_message() {
        assert_eq!(
            parse_client_message(r#"{"type":"key","key":"ArrowUp"}"#),
            Some(ParsedClientMessage::Key {
                key: "ArrowUp".to_string()
            })
        );
        assert!(parse_client_message(r#"{"type":"key","key":"  "}"#).is_none());
        assert!(parse_client_message(r#"{"type":"key","key":3}"#).is_none());
    }

    #[test]
    fn parse_move_rejects_unknown_direction() {
        assert_eq!(
            parse_client_message(r#"{"type":"move","dir":"left"}"#),
            Some(ParsedClientMessage::Move {
                dir: Direction::Left
            })
        );
        assert!(parse_client_message(r#"{"type":"move","dir":"sideways"}"#).is_none());
    }

    #[test]
    fn parse_click_floors_fractional_cells() {
        assert_eq!(
            parse_client_message(r#"{"type":"click","x":3,"y":4.7}"#),
            Some(ParsedClientMessage::Click {
                target: Coord::new(3, 4)
            })
        );
        assert!(parse_client_message(r#"{"type":"click","x":3}"#).is_none());
        assert!(parse_client_message(r#"{"type":"click","x":"3","y":1}"#).is_none());
        assert!(parse_client_message(r#"{"type":"click","x":1e100,"y":1}"#).is_none());
    }

    #[test]
    fn parse_tilt_defaults_missing_axes_and_clamps() {
        assert_eq!(
            parse_client_message(r#"{"type":"tilt","gamma":12.5}"#),
            Some(ParsedClientMessage::Tilt {
                beta: 0.0,
                gamma: 12.5
            })
        );
        assert_eq!(
            parse_client_message(r#"{"type":"tilt","beta":720,"gamma":null}"#),
            Some(ParsedClientMessage::Tilt {
                beta: 180.0,
                gamma: 0.0
            })
        );
        assert!(parse_client_message(r#"{"type":"tilt","beta":"flat"}"#).is_none());
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(parse_client_message("not json").is_none());
        assert!(parse_client_message("[1,2]").is_none());
        assert!(parse_client_message(r#"{"kind":"start"}"#).is_none());
        assert!(parse_client_message(r#"{"type":"jump"}"#).is_none());
    }

    #[test]
    fn error_message_shape() {
        let value = error_message("invalid message");
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "invalid message");
    }
}
