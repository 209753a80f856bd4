use std::io::{Read, Write};

use base64::prelude::*;
use flate2::{Compression, read::GzDecoder, write::GzEncoder};

use crate::{
    common::errors::{StoreError, StoreResult},
    snapshot::{PlayerSnapshot, schema},
};

/// Serializes and gzips a snapshot.
pub fn encode(snapshot: &PlayerSnapshot) -> StoreResult<Vec<u8>> {
    let json = serde_json::to_vec(snapshot)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| StoreError::Codec(format!("failed to compress snapshot: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| StoreError::Codec(format!("failed to finish compression: {}", e)))
}

/// Inflates a blob, upgrades it to the current schema and deserializes it.
pub fn decode(blob: &[u8]) -> StoreResult<PlayerSnapshot> {
    let mut json = Vec::new();
    GzDecoder::new(blob)
        .read_to_end(&mut json)
        .map_err(|e| StoreError::Codec(format!("failed to decompress snapshot: {}", e)))?;

    let value: serde_json::Value = serde_json::from_slice(&json)?;
    let mut snapshot: PlayerSnapshot = serde_json::from_value(schema::upgrade(value)?)?;
    snapshot.normalize();
    Ok(snapshot)
}

pub fn encode_base64(snapshot: &PlayerSnapshot) -> StoreResult<String> {
    Ok(BASE64_STANDARD.encode(encode(snapshot)?))
}

pub fn decode_base64(data: &str) -> StoreResult<PlayerSnapshot> {
    decode(&BASE64_STANDARD.decode(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{ChannelId, GuildId, UserId};

    #[test]
    fn empty_optionals_survive_encoding() {
        let mut snapshot = PlayerSnapshot::new(GuildId(10), ChannelId(20), UserId(30));
        snapshot.saved_at = 1_700_000_000_000;

        let decoded = decode_base64(&encode_base64(&snapshot).unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
        assert!(decoded.text_channel_id.is_none());
        assert!(decoded.voice_state.is_none());
    }

    #[test]
    fn legacy_blobs_decode_through_the_upgrade_path() {
        let legacy = serde_json::json!({
            "guild_id": 5,
            "volume": 80,
            "voice_channel_id": 6,
            "creator": 7,
            "loop": "queue",
            "played": [],
            "saved_at": 42,
        });
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(legacy.to_string().as_bytes()).unwrap();
        let blob = encoder.finish().unwrap();

        let snapshot = decode(&blob).unwrap();
        assert_eq!(snapshot.version, schema::SNAPSHOT_VERSION);
        assert_eq!(snapshot.loop_mode, crate::snapshot::LoopMode::Queue);
        assert_eq!(snapshot.volume, 80);
        assert!(!snapshot.keep_connected);
    }

    #[test]
    fn garbage_is_a_codec_error() {
        assert!(matches!(decode(b"not gzip"), Err(StoreError::Codec(_))));
        assert!(matches!(decode_base64("%%%"), Err(StoreError::Codec(_))));
    }
}
