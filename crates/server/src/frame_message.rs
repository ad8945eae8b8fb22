use serde::Deserialize;

/// JSON envelope carrying one encoded frame.
///
/// Clients have historically used either field name; unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct FrameMessage {
    #[serde(default)]
    pub base64_frame: Option<String>,
    #[serde(default)]
    pub frame: Option<String>,
}

impl FrameMessage {
    /// The first non-empty payload, preferring `base64_frame`.
    pub fn into_payload(self) -> Option<String> {
        [self.base64_frame, self.frame]
            .into_iter()
            .flatten()
            .find(|payload| !payload.trim().is_empty())
    }
}
