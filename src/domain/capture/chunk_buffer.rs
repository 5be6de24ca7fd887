//! Ordered accumulator for captured data fragments

use crate::domain::recording::{AudioData, AudioMimeType};

/// Fragments delivered by a media session, in capture order.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: Vec<Vec<u8>>,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Empty fragments are dropped.
    pub fn push(&mut self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total number of buffered bytes
    pub fn size_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Concatenate every fragment into one payload and leave the buffer empty
    pub fn take_payload(&mut self, mime_type: AudioMimeType) -> AudioData {
        AudioData::from_chunks(std::mem::take(&mut self.chunks), mime_type)
    }

    /// Discard all buffered fragments
    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}
