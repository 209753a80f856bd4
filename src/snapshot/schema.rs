//! Stored snapshots are upgraded one version at a time before they are
//! deserialized, so an old blob is never read with the current field layout.
//!
//! * v1: `loop` is `false | "current" | "queue"`, history lives in `played`.
//! * v2: `loop_mode` enum, `history`, custom skins inlined as
//!   `custom_skin_data: { normal, static }`.
//! * v3: `keep_connected`, custom skins as two top-level optional fields.

use serde_json::{Map, Value};

use crate::common::errors::{StoreError, StoreResult};

pub const SNAPSHOT_VERSION: u32 = 3;

/// Reads the stored version; blobs written before versioning count as v1.
pub fn stored_version(value: &Value) -> u32 {
    value
        .get("version")
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .unwrap_or(1)
}

pub fn upgrade(mut value: Value) -> StoreResult<Value> {
    let mut version = stored_version(&value);
    if version == 0 {
        return Err(StoreError::Codec("snapshot version 0 does not exist".into()));
    }
    if version > SNAPSHOT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found: version,
            supported: SNAPSHOT_VERSION,
        });
    }

    let object = value
        .as_object_mut()
        .ok_or_else(|| StoreError::Codec("snapshot is not a JSON object".into()))?;

    while version < SNAPSHOT_VERSION {
        match version {
            1 => v1_to_v2(object),
            2 => v2_to_v3(object),
            other => {
                return Err(StoreError::Codec(format!("no upgrade path from version {other}")));
            }
        }
        version += 1;
        object.insert("version".into(), Value::from(version));
    }

    Ok(value)
}

fn v1_to_v2(object: &mut Map<String, Value>) {
    let loop_mode = match object.remove("loop") {
        Some(Value::String(s)) if s == "current" => "track",
        Some(Value::String(s)) if s == "queue" => "queue",
        _ => "off",
    };
    object.insert("loop_mode".into(), Value::from(loop_mode));

    if let Some(played) = object.remove("played") {
        object.insert("history".into(), played);
    }
}

fn v2_to_v3(object: &mut Map<String, Value>) {
    object
        .entry("keep_connected")
        .or_insert(Value::Bool(false));

    if let Some(Value::Object(mut custom)) = object.remove("custom_skin_data") {
        if let Some(normal) = custom.remove("normal") {
            object.insert("custom_skin".into(), normal);
        }
        if let Some(static_skin) = custom.remove("static") {
            object.insert("custom_static_skin".into(), static_skin);
        }
    }
}
