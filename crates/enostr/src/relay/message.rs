use crate::{Error, Note, Result};
use serde_json::Value;

/// Messages a relay sends to a subscribing client.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RelayMessage {
    Event { sub_id: String, note: Note },
    Eose(String),
    Closed { sub_id: String, reason: String },
    Notice(String),
    /// Reply to a published event. We only subscribe, so these are logged.
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
}

impl RelayMessage {
    pub fn from_json(msg: &str) -> Result<RelayMessage> {
        if msg.trim().is_empty() {
            return Err(Error::Empty);
        }

        let Value::Array(mut parts) = serde_json::from_str(msg)? else {
            return Err(Error::DecodeFailed("relay message is not an array".into()));
        };

        let kind = string_at(&parts, 0)?;

        match (kind.as_str(), parts.len()) {
            // ["EVENT", <subscription id>, <event>]
            ("EVENT", 3) => {
                let note: Note = serde_json::from_value(parts.swap_remove(2))?;
                Ok(RelayMessage::Event {
                    sub_id: string_at(&parts, 1)?,
                    note,
                })
            }

            // ["EOSE", <subscription id>]
            ("EOSE", 2) => Ok(RelayMessage::Eose(string_at(&parts, 1)?)),

            // ["CLOSED", <subscription id>, <message>], message optional
            ("CLOSED", 2 | 3) => Ok(RelayMessage::Closed {
                sub_id: string_at(&parts, 1)?,
                reason: parts
                    .get(2)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
            }),

            ("NOTICE", 2) => Ok(RelayMessage::Notice(string_at(&parts, 1)?)),

            // ["OK", <event id>, <true|false>, <message>]
            ("OK", 4) => Ok(RelayMessage::Ok {
                event_id: string_at(&parts, 1)?,
                accepted: parts[2]
                    .as_bool()
                    .ok_or_else(|| Error::DecodeFailed("bad boolean value".into()))?,
                message: string_at(&parts, 3)?,
            }),

            (kind, n) => Err(Error::DecodeFailed(format!(
                "unrecognized {kind} message with {n} elements"
            ))),
        }
    }
}

fn string_at(parts: &[Value], i: usize) -> Result<String> {
    parts
        .get(i)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::DecodeFailed(format!("element {i} is not a string")))
}
