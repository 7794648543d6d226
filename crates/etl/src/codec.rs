//! Stage artifact encoding: a JSON array inside an LZ4 frame.

use std::io::Write;

use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("artifact is not a valid LZ4 frame: {0}")]
    Compression(#[from] lz4_flex::frame::Error),

    #[error("artifact could not be (de)serialised: {0}")]
    Json(#[from] serde_json::Error),

    #[error("artifact could not be written: {0}")]
    Io(#[from] std::io::Error),
}

pub fn encode<'a, T, I>(records: I) -> Result<Vec<u8>, CodecError>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let records: Vec<&T> = records.into_iter().collect();
    let mut encoder = FrameEncoder::new(Vec::new());
    serde_json::to_writer(&mut encoder, &records)?;
    encoder.flush()?;
    Ok(encoder.finish()?)
}

/// Zero bytes decode to no records.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>, CodecError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_reader(FrameDecoder::new(bytes))?)
}

/// The encoding of an empty batch, as written when a stage is reset.
pub fn empty() -> Result<Vec<u8>, CodecError> {
    encode::<serde_json::Value, _>(&[])
}
