mod jid;

pub use jid::{Jid, JidParseError, DEFAULT_USER_SERVER};

use sha2::Digest;

/// Call ID type (opaque string naming one call attempt).
pub type CallId = String;

/// Generate a call ID: 32 uppercase hex characters from a hash of the
/// current time and 16 random bytes.
pub fn generate_call_id() -> CallId {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut data = Vec::with_capacity(16 + 16);
    data.extend_from_slice(&nanos.to_be_bytes());
    data.extend_from_slice(&rand::random::<[u8; 16]>());
    let hash = sha2::Sha256::digest(&data);
    hex::encode_upper(&hash[..16])
}

/// Media type of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallMedia {
    Audio,
    Video,
}

impl CallMedia {
    pub fn from_video_flag(is_video: bool) -> Self {
        if is_video {
            Self::Video
        } else {
            Self::Audio
        }
    }

    pub fn is_video(self) -> bool {
        self == Self::Video
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_call_id_format() {
        let id = generate_call_id();
        assert_eq!(id.len(), 32);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert_ne!(id, generate_call_id());
    }

    #[test]
    fn call_media_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&CallMedia::from_video_flag(true)).unwrap(),
            "\"video\""
        );
        assert!(!CallMedia::Audio.is_video());
    }
}
