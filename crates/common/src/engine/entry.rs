//! Framing for entries inside a bucket blob.
//!
//! A bucket is a plain concatenation, so each entry carries its own
//! length: `u32 big-endian length || body`.

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_SIZE: usize = 4;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("entry body of {0} bytes does not fit a frame")]
    TooLarge(usize),
    #[error("bucket truncated at offset {0}")]
    Truncated(usize),
}

/// Prefix `body` with its length
pub fn frame(body: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u32::try_from(body.len()).map_err(|_| FrameError::TooLarge(body.len()))?;
    let mut out = Vec::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

/// Split a bucket blob back into entry bodies, in insertion order
pub fn split_entries(bucket: &[u8]) -> Result<Vec<&[u8]>, FrameError> {
    let mut entries = Vec::new();
    let mut offset = 0;
    while offset < bucket.len() {
        let header = bucket
            .get(offset..offset + LENGTH_PREFIX_SIZE)
            .ok_or(FrameError::Truncated(offset))?;
        let mut len_bytes = [0u8; LENGTH_PREFIX_SIZE];
        len_bytes.copy_from_slice(header);
        let len = u32::from_be_bytes(len_bytes) as usize;

        let start = offset + LENGTH_PREFIX_SIZE;
        let body = bucket
            .get(start..start + len)
            .ok_or(FrameError::Truncated(offset))?;
        entries.push(body);
        offset = start + len;
    }
    Ok(entries)
}
