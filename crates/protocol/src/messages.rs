use serde::{Deserialize, Serialize};

/// Messages sent into the upload worker.
///
/// The `chunk` field is base64-encoded in JSON, the standard encoding for
/// binary payloads crossing a serialized message boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerRequest {
    /// Creates an isolated buffer/session pair for one recording.
    #[serde(rename_all = "camelCase")]
    Initialize {
        instance_id: String,
        destination_url: String,
        content_type: String,
    },
    /// Delivers one captured fragment. `is_last` occurs exactly once, on
    /// the final fragment.
    #[serde(rename_all = "camelCase")]
    BufferChunk {
        instance_id: String,
        #[serde(with = "base64_bytes")]
        chunk: Vec<u8>,
        is_last: bool,
    },
}

/// Messages emitted by the upload worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerResponse {
    /// A chunk was accepted by the destination. When `is_final` is set,
    /// `video_upload_response` carries the destination's terminal payload.
    #[serde(rename_all = "camelCase")]
    UploadSuccess {
        instance_id: String,
        is_final: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        video_upload_response: Option<serde_json::Value>,
    },
    /// The instance failed terminally.
    #[serde(rename_all = "camelCase")]
    UploadError { instance_id: String, error: String },
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
