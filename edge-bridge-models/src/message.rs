use bytes::Bytes;

/// A raw broker message: slash-delimited channel plus payload.
///
/// Payloads are JSON text on every channel except the binary file-transfer
/// channel, so the content is kept as bytes with a UTF-8 accessor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub channel: String,
    pub content: Bytes,
}

impl Message {
    pub fn new(channel: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            channel: channel.into(),
            content: content.into(),
        }
    }

    /// Content as text, if it is valid UTF-8.
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_accessor() {
        let msg = Message::new("d2p/ping/g/GW", "{}".as_bytes().to_vec());
        assert_eq!(msg.as_text(), Some("{}"));

        let binary = Message::new("p2d/file_upload_binary", vec![0xff, 0xfe]);
        assert_eq!(binary.as_text(), None);
    }
}
