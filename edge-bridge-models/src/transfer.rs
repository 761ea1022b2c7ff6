//! File transfer wire types.

use bytes::Bytes;
use edge_bridge_utils::hash::sha256_raw;
use serde::{Deserialize, Serialize};

/// Length of the SHA-256 digests framing every binary chunk.
pub const CHUNK_HASH_LEN: usize = 32;

/// Lifecycle status of a transfer, reported toward the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileTransferStatus {
    FileTransfer,
    FileReady,
    Aborted,
    Error,
}

/// Error taxonomy shared by the file and firmware subsystems.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileTransferError {
    UnspecifiedError,
    TransferProtocolDisabled,
    UnsupportedFileSize,
    MalformedResponse,
    FileHashMismatch,
    FileSystemError,
    RetryCountExceeded,
}

/// Status message for one named transfer. An error implies status `ERROR`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadStatus {
    pub file_name: String,
    pub status: FileTransferStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FileTransferError>,
}

impl FileUploadStatus {
    pub fn ok(file_name: impl Into<String>, status: FileTransferStatus) -> Self {
        Self {
            file_name: file_name.into(),
            status,
            error: None,
        }
    }

    pub fn err(file_name: impl Into<String>, error: FileTransferError) -> Self {
        Self {
            file_name: file_name.into(),
            status: FileTransferStatus::Error,
            error: Some(error),
        }
    }
}

/// Platform request opening a chunked transfer. `hash` is base64 of the
/// SHA-256 over the complete file bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadInitiate {
    pub name: String,
    pub size: u64,
    pub hash: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadAbort {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDelete {
    pub name: String,
}

/// Request for one chunk, emitted toward the platform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePacketRequest {
    pub file_name: String,
    pub chunk_index: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    pub files: Vec<String>,
}

/// A stored file, keyed by name in the file repository. `hash` is base64
/// of the SHA-256 over the file bytes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    pub hash: String,
    pub path: String,
}

/// One decoded binary chunk: previous chunk's hash, payload, own hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryData {
    pub previous_hash: [u8; CHUNK_HASH_LEN],
    pub data: Bytes,
    pub current_hash: [u8; CHUNK_HASH_LEN],
}

impl BinaryData {
    /// Decode a raw chunk payload. Fails when the frame is too short to
    /// carry both hashes and at least one data byte.
    pub fn from_bytes(payload: &[u8]) -> Option<BinaryData> {
        if payload.len() <= 2 * CHUNK_HASH_LEN {
            return None;
        }

        let mut previous_hash = [0u8; CHUNK_HASH_LEN];
        previous_hash.copy_from_slice(&payload[..CHUNK_HASH_LEN]);

        let mut current_hash = [0u8; CHUNK_HASH_LEN];
        current_hash.copy_from_slice(&payload[payload.len() - CHUNK_HASH_LEN..]);

        let data = Bytes::copy_from_slice(&payload[CHUNK_HASH_LEN..payload.len() - CHUNK_HASH_LEN]);

        Some(BinaryData {
            previous_hash,
            data,
            current_hash,
        })
    }

    /// Whether the payload matches its own trailing hash.
    #[inline]
    pub fn valid(&self) -> bool {
        sha256_raw(&self.data) == self.current_hash
    }

    /// Encode as a wire frame. Used by tests and simulators.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 * CHUNK_HASH_LEN + self.data.len());
        out.extend_from_slice(&self.previous_hash);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.current_hash);
        out
    }

    /// Build a valid chunk for `data` chained onto `previous_hash`.
    pub fn make(previous_hash: [u8; CHUNK_HASH_LEN], data: &[u8]) -> BinaryData {
        BinaryData {
            previous_hash,
            data: Bytes::copy_from_slice(data),
            current_hash: sha256_raw(data),
        }
    }
}
