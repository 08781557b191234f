use crate::{Error, Filter};
use serde_json::{json, Value};

/// What we send to relays: open a subscription, or close one.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    Req { sub_id: String, filters: Vec<Filter> },
    Close { sub_id: String },
}

impl ClientMessage {
    pub fn req(sub_id: String, filters: Vec<Filter>) -> Self {
        ClientMessage::Req { sub_id, filters }
    }

    pub fn close(sub_id: String) -> Self {
        ClientMessage::Close { sub_id }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        let frame = match self {
            Self::Req { sub_id, filters } => {
                let mut frame = vec![json!("REQ"), json!(sub_id)];
                for filter in filters {
                    frame.push(serde_json::to_value(filter)?);
                }
                // a REQ needs at least one filter
                if filters.is_empty() {
                    frame.push(json!({}));
                }
                Value::Array(frame)
            }
            Self::Close { sub_id } => json!(["CLOSE", sub_id]),
        };

        Ok(frame.to_string())
    }
}
