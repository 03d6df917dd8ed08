//! Turns a raw response into a snapshot: decompress, sniff, parse, date.

use std::io::Read;

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use serde_json::Value;

use crate::domain::wire;
use crate::polling::api::{FetchError, RawResponse};

fn read_all<R: Read>(mut reader: R, encoding: &str) -> Result<Vec<u8>, FetchError> {
    let mut out = Vec::new();
    reader
        .read_to_end(&mut out)
        .map_err(|source| FetchError::Decompress {
            encoding: encoding.to_string(),
            source,
        })?;
    Ok(out)
}

/// Decompresses `body` according to its `Content-Encoding`.
pub fn decompress(encoding: Option<&str>, body: &[u8]) -> Result<Vec<u8>, FetchError> {
    let encoding = encoding.map(|e| e.trim().to_ascii_lowercase());

    match encoding.as_deref() {
        None | Some("") | Some("identity") => Ok(body.to_vec()),
        Some("gzip") | Some("x-gzip") => read_all(GzDecoder::new(body), "gzip"),
        // Servers disagree on whether deflate means zlib-wrapped or raw.
        Some("deflate") => read_all(ZlibDecoder::new(body), "deflate")
            .or_else(|_| read_all(DeflateDecoder::new(body), "deflate")),
        Some(other) => Err(FetchError::UnsupportedEncoding(other.to_string())),
    }
}

/// Cheap structural check run before parsing.
pub fn looks_like_snapshot(text: &str, key: &str) -> bool {
    let text = text.trim();
    text.starts_with('{') && text.ends_with('}') && text.contains(&format!("\"{key}\""))
}

/// Snapshot time in seconds: an integer or a `$date` object.
pub fn timestamp(snapshot: &Value, key: &str) -> Option<i64> {
    wire::date_field(snapshot, key)
}

/// Full decode of one response.
pub fn decode(response: &RawResponse, key: &str) -> Result<(Value, i64), FetchError> {
    let bytes = decompress(response.content_encoding.as_deref(), &response.body)?;
    let text = String::from_utf8_lossy(&bytes);
    if !looks_like_snapshot(&text, key) {
        return Err(FetchError::Shape);
    }

    let snapshot: Value = serde_json::from_str(&text)?;
    let ts = timestamp(&snapshot, key).ok_or(FetchError::MissingTimestamp)?;
    Ok((snapshot, ts))
}
