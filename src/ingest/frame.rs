//! Frame decompression and parsing (§4.4 steps 2-3).

use std::io::Read;
use std::time::Duration;

use flate2::read::ZlibDecoder;
use serde::Deserialize;

use crate::error::IngestError;

const DECOMPRESS_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct EddnFrame {
    #[serde(rename = "$schemaRef")]
    pub schema_ref: String,
    pub header: EddnHeader,
    pub message: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct EddnHeader {
    #[serde(rename = "gatewayTimestamp")]
    pub gateway_timestamp: Option<String>,
    pub timestamp: Option<String>,
    pub gameversion: Option<String>,
}

impl EddnFrame {
    /// `schemaRef || gatewayTimestamp-or-timestamp` (§4.4 step 5).
    pub fn dedup_key(&self) -> String {
        let stamp = self
            .header
            .gateway_timestamp
            .as_deref()
            .or(self.header.timestamp.as_deref())
            .unwrap_or("");
        format!("{}|{}", self.schema_ref, stamp)
    }
}

/// Decompresses a raw zlib-compressed frame with a 5 s wall-clock deadline, running the
/// (synchronous, CPU-bound) inflate on a blocking thread so it never stalls the ingestion loop.
pub async fn decompress(raw: Vec<u8>) -> Result<String, IngestError> {
    let task = tokio::task::spawn_blocking(move || inflate(&raw));
    match tokio::time::timeout(DECOMPRESS_DEADLINE, task).await {
        Ok(Ok(Ok(text))) => Ok(text),
        Ok(Ok(Err(e))) => Err(IngestError::Decompress(e.to_string())),
        Ok(Err(_join_error)) => Err(IngestError::Decompress("decompression task panicked".into())),
        Err(_elapsed) => Err(IngestError::DecompressTimeout),
    }
}

fn inflate(raw: &[u8]) -> std::io::Result<String> {
    let mut decoder = ZlibDecoder::new(raw);
    let mut out = String::new();
    decoder.read_to_string(&mut out)?;
    Ok(out)
}

pub fn parse(text: &str) -> Result<EddnFrame, IngestError> {
    serde_json::from_str(text).map_err(IngestError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn compress(text: &str) -> Vec<u8> {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn round_trips_a_compressed_frame() {
        let json = r#"{"$schemaRef":"https://eddn.edcd.io/schemas/commodity/3","header":{"gatewayTimestamp":"2026-01-01T00:00:00Z","gameversion":"4.0.0.0"},"message":{"marketId":1}}"#;
        let compressed = compress(json);
        let text = decompress(compressed).await.unwrap();
        let frame = parse(&text).unwrap();
        assert_eq!(frame.schema_ref, "https://eddn.edcd.io/schemas/commodity/3");
        assert_eq!(frame.dedup_key(), "https://eddn.edcd.io/schemas/commodity/3|2026-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn corrupt_frame_errors_instead_of_panicking() {
        let result = decompress(vec![1, 2, 3, 4]).await;
        assert!(result.is_err());
    }

    #[test]
    fn dedup_key_falls_back_to_timestamp() {
        let frame = EddnFrame {
            schema_ref: "s".into(),
            header: EddnHeader { gateway_timestamp: None, timestamp: Some("t1".into()), gameversion: None },
            message: serde_json::Value::Null,
        };
        assert_eq!(frame.dedup_key(), "s|t1");
    }
}
