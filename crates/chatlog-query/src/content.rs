//! Message body decoding and room sender extraction

use rusqlite::types::Value;
use tracing::debug;

/// zstd frame magic; compressed bodies start with it
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Separator between the sender id and the body in room messages
pub const ROOM_SENDER_SEPARATOR: &str = ":\n";

/// Turn a `message_content` cell into text.
///
/// Blobs are decompressed when they carry the zstd magic; anything that
/// fails to decompress or is not UTF-8 is decoded lossily instead.
pub fn content_text(value: Value) -> String {
    match value {
        Value::Text(text) => text,
        Value::Blob(blob) => decode_blob(&blob),
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
    }
}

pub fn decode_blob(blob: &[u8]) -> String {
    if blob.starts_with(&ZSTD_MAGIC) {
        match zstd::stream::decode_all(blob) {
            Ok(plain) => return String::from_utf8_lossy(&plain).into_owned(),
            Err(e) => debug!(error = %e, len = blob.len(), "zstd body failed to decompress"),
        }
    }
    String::from_utf8_lossy(blob).into_owned()
}

/// Split `"<sender>:\n<body>"` on the first separator.
pub fn split_room_sender(content: &str) -> Option<(&str, &str)> {
    content.split_once(ROOM_SENDER_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(content_text(Value::Text("hello".into())), "hello");
        assert_eq!(content_text(Value::Null), "");
        assert_eq!(content_text(Value::Blob(b"raw".to_vec())), "raw");
    }

    #[test]
    fn zstd_blob_is_decompressed() {
        let blob = zstd::encode_all("压缩的消息".as_bytes(), 3).unwrap();
        assert!(blob.starts_with(&ZSTD_MAGIC));
        assert_eq!(content_text(Value::Blob(blob)), "压缩的消息");
    }

    #[test]
    fn broken_zstd_falls_back_to_raw() {
        let mut blob = ZSTD_MAGIC.to_vec();
        blob.extend_from_slice(b"not a frame");
        let text = decode_blob(&blob);
        assert!(text.ends_with("not a frame"));
    }

    #[test]
    fn invalid_utf8_is_lossy() {
        assert_eq!(decode_blob(&[b'o', b'k', 0xff]), "ok\u{fffd}");
    }

    #[test]
    fn room_sender_split() {
        assert_eq!(split_room_sender("wxid_abc:\n你好"), Some(("wxid_abc", "你好")));
        assert_eq!(
            split_room_sender("wxid_abc:\nline one:\nline two"),
            Some(("wxid_abc", "line one:\nline two"))
        );
        assert_eq!(split_room_sender("no prefix here"), None);
    }
}
