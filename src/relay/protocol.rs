//! JSON frames spoken on the relay socket.

use std::cmp::Ordering;

use serde_json::{Map, Value, json};

use crate::common::{
    errors::RelayError,
    types::{BotId, UserId},
};

/// Close code sent after a `disconnect` frame.
pub const DISCONNECT_CLOSE_CODE: u16 = 4000;
pub const MAX_VIEWER_USERS: usize = 3;
pub const TOKEN_LENGTH: usize = 50;
/// Stripped from updates whose token does not match.
pub const SENSITIVE_FIELDS: [&str; 3] = ["token", "track", "info"];

pub const EVICTED_REASON: &str = "A new session was started elsewhere.";

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    BotHandshake {
        bot_ids: Vec<BotId>,
        auth_enabled: bool,
    },
    ViewerHandshake {
        user_ids: Vec<UserId>,
        version: String,
        token: String,
        auth_enabled: bool,
    },
    /// Per-user update; `message` is forwarded as-is apart from stripping.
    Update {
        user: UserId,
        token: Option<String>,
        message: Map<String, Value>,
    },
    Close,
    Other(Map<String, Value>),
}

/// Ids arrive as numbers or as strings.
pub fn parse_id(value: &Value) -> Option<UserId> {
    match value {
        Value::Number(n) => n.as_u64().map(UserId),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn parse_ids(value: &Value) -> Result<Vec<UserId>, RelayError> {
    let Value::Array(items) = value else {
        return Err(RelayError::Malformed("user_ids must be an array".into()));
    };
    items
        .iter()
        .map(|item| parse_id(item).ok_or_else(|| RelayError::Malformed(format!("invalid user id {item}"))))
        .collect()
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| RelayError::Malformed(e.to_string()))?;
        let Value::Object(message) = value else {
            return Err(RelayError::Malformed("frame is not an object".into()));
        };

        let flag = |key: &str| message.get(key).and_then(Value::as_bool).unwrap_or(false);
        let text_field = |key: &str| {
            message
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        if let Some(ids) = message.get("user_ids") {
            let ids = parse_ids(ids)?;
            if flag("bot") {
                return Ok(Self::BotHandshake {
                    bot_ids: ids,
                    auth_enabled: flag("auth_enabled"),
                });
            }
            return Ok(Self::ViewerHandshake {
                user_ids: ids,
                version: text_field("version").unwrap_or_default(),
                token: text_field("token").unwrap_or_default(),
                auth_enabled: flag("auth_enabled"),
            });
        }

        if let Some(user) = message.get("user") {
            let user = parse_id(user).ok_or_else(|| RelayError::Malformed(format!("invalid user {user}")))?;
            return Ok(Self::Update {
                user,
                token: text_field("token"),
                message,
            });
        }

        if message.get("op").and_then(Value::as_str) == Some("close") {
            return Ok(Self::Close);
        }
        Ok(Self::Other(message))
    }
}

/// Compares dotted versions numerically; missing components count as zero
/// and non-numeric suffixes are ignored.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parts = |v: &str| -> Vec<u64> {
        v.trim()
            .trim_start_matches('v')
            .split('.')
            .map(|part| {
                let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().unwrap_or(0)
            })
            .collect()
    };
    let (a, b) = (parts(a), parts(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let ord = a.get(i).copied().unwrap_or(0).cmp(&b.get(i).copied().unwrap_or(0));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

pub fn validate_viewer(
    user_ids: &[UserId],
    version: &str,
    token: &str,
    min_version: &str,
) -> Result<(), RelayError> {
    if compare_versions(version, min_version) == Ordering::Less {
        return Err(RelayError::OutdatedClient {
            found: version.to_string(),
            minimum: min_version.to_string(),
        });
    }
    if user_ids.is_empty() {
        return Err(RelayError::MissingUsers);
    }
    if user_ids.len() > MAX_VIEWER_USERS {
        return Err(RelayError::TooManyUsers {
            found: user_ids.len(),
            max: MAX_VIEWER_USERS,
        });
    }
    let token_len = token.chars().count();
    if token_len != 0 && token_len != TOKEN_LENGTH {
        return Err(RelayError::InvalidTokenLength {
            found: token_len,
            expected: TOKEN_LENGTH,
        });
    }
    Ok(())
}

pub fn disconnect(reason: &str) -> Value {
    json!({ "op": "disconnect", "reason": reason })
}

pub fn close_bots(bot_ids: &[BotId]) -> Value {
    json!({ "op": "close", "bot_id": bot_ids })
}

pub fn request_update(user: UserId) -> Value {
    json!({ "op": "rpc_update", "user": user })
}

/// Update with its sensitive fields removed, turned into an exception notice.
pub fn token_exception(mut message: Map<String, Value>) -> Value {
    for field in SENSITIVE_FIELDS {
        message.remove(field);
    }
    message.insert("op".into(), json!("exception"));
    message.insert(
        "message".into(),
        json!("The token used by this application does not match the one registered with the bot."),
    );
    Value::Object(message)
}
