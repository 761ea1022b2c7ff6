//! Chunk assembler for one file transfer.
//!
//! Chunks arrive framed as `previousHash (32) || payload || currentHash
//! (32)`. A chunk is accepted iff its payload matches its own hash and,
//! past the first chunk, its `previousHash` equals the previous chunk's
//! `currentHash`. Invalid chunks are re-requested up to a bounded retry
//! count. After the last chunk the whole byte stream must match the hash
//! announced at initiation.

use edge_bridge_models::transfer::CHUNK_HASH_LEN;
use edge_bridge_models::{BinaryData, FilePacketRequest, FileTransferError};
use edge_bridge_utils::hash::sha256_raw;
use tracing::{debug, warn};

/// Re-requests allowed per chunk before the transfer is failed.
const MAX_CHUNK_RETRIES: u32 = 3;

#[derive(Debug, PartialEq)]
pub enum ChunkOutcome {
    /// Chunk accepted; request the next one.
    Accepted(FilePacketRequest),
    /// Chunk rejected; request the same index again.
    Retry(FilePacketRequest),
    /// All chunks received and the end-to-end hash matches.
    Completed,
    /// Transfer failed; the slot must be released.
    Failed(FileTransferError),
}

pub struct FileDownloader {
    file_name: String,
    expected_hash: Vec<u8>,
    chunk_count: u64,
    next_chunk: u64,
    retries: u32,
    previous_hash: [u8; CHUNK_HASH_LEN],
    buffer: Vec<u8>,
}

impl FileDownloader {
    pub fn new(file_name: impl Into<String>, file_size: u64, expected_hash: Vec<u8>, max_packet_size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            expected_hash,
            chunk_count: file_size.div_ceil(max_packet_size),
            next_chunk: 0,
            retries: 0,
            previous_hash: [0u8; CHUNK_HASH_LEN],
            buffer: Vec::with_capacity(file_size as usize),
        }
    }

    /// Request for the first chunk.
    pub fn first_request(&self) -> FilePacketRequest {
        self.request(0)
    }

    pub fn handle_chunk(&mut self, chunk: &BinaryData) -> ChunkOutcome {
        let chained = self.next_chunk == 0 || chunk.previous_hash == self.previous_hash;

        if !chunk.valid() || !chained {
            self.retries += 1;
            if self.retries > MAX_CHUNK_RETRIES {
                warn!(
                    file = %self.file_name,
                    chunk = self.next_chunk,
                    "Chunk retry budget exhausted"
                );
                return ChunkOutcome::Failed(FileTransferError::RetryCountExceeded);
            }
            debug!(
                file = %self.file_name,
                chunk = self.next_chunk,
                retry = self.retries,
                "Invalid chunk, requesting again"
            );
            return ChunkOutcome::Retry(self.request(self.next_chunk));
        }

        self.retries = 0;
        self.buffer.extend_from_slice(&chunk.data);
        self.previous_hash = chunk.current_hash;
        self.next_chunk += 1;

        if self.next_chunk < self.chunk_count {
            return ChunkOutcome::Accepted(self.request(self.next_chunk));
        }

        if sha256_raw(&self.buffer)[..] == self.expected_hash[..] {
            ChunkOutcome::Completed
        } else {
            warn!(file = %self.file_name, "Assembled file hash mismatch");
            ChunkOutcome::Failed(FileTransferError::FileHashMismatch)
        }
    }

    /// Assembled bytes; valid once `Completed` was returned.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    fn request(&self, chunk_index: u64) -> FilePacketRequest {
        FilePacketRequest {
            file_name: self.file_name.clone(),
            chunk_index,
        }
    }
}
