//! Wire format of the chunked upload service

use serde::Deserialize;

/// Response of `upload/set_metadata/{asset}`
#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct MetadataResponse {
    #[serde(default)]
    pub chunk_size: u64,
    #[serde(default)]
    pub chunk_list: Vec<u64>,
    #[serde(default)]
    pub blob_partitions: Option<u64>,
    #[serde(default)]
    pub resume_restart: bool,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `upload/upload_chunk/{asset}`
#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct ChunkResponse {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `upload/finished/{asset}`
#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct FinishedResponse {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub missing_chunks: Vec<u64>,
}

impl FinishedResponse {
    /// The service confirmed every chunk
    pub fn is_done(&self) -> bool {
        !self.error && self.state.as_deref() == Some("Done")
    }
}

/// Response of `upload/cancel/{asset}`
#[derive(Clone, Debug, Default, Deserialize)]
pub(crate) struct CancelResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Byte range `[start, end)` covered by 1-based chunk `number`
pub(crate) fn chunk_range(number: u64, chunk_size: u64, file_size: u64) -> (u64, u64) {
    let start = number.saturating_sub(1).saturating_mul(chunk_size);
    let end = number.saturating_mul(chunk_size).min(file_size);
    (start.min(file_size), end)
}

/// Number of chunks needed for `file_size` bytes
pub(crate) fn total_chunks(file_size: u64, chunk_size: u64) -> u64 {
    file_size.div_ceil(chunk_size)
}
