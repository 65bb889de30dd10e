// src/recording/compressor.rs
//! zstd codec for queue snapshots

use crate::utils::errors::{Result, TelemetryError};
use tracing::debug;

/// Compressor using zstd
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    level: i32,
}

impl Compressor {
    /// Create a new compressor; `level` is clamped to zstd's supported range
    pub fn new(level: i32) -> Self {
        let range = zstd::compression_level_range();
        Self {
            level: level.clamp(*range.start(), *range.end()),
        }
    }

    /// Compress data
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let compressed = zstd::encode_all(data, self.level).map_err(|e| {
            TelemetryError::CompressionFailed(format!("Compression error: {}", e))
        })?;

        debug!(
            "Compressed snapshot {} bytes -> {} bytes (level {})",
            data.len(),
            compressed.len(),
            self.level
        );

        Ok(compressed)
    }

    /// Decompress data
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::decode_all(data).map_err(|e| {
            TelemetryError::CompressionFailed(format!("Decompression error: {}", e))
        })
    }

    pub fn level(&self) -> i32 {
        self.level
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(zstd::DEFAULT_COMPRESSION_LEVEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_decompress() {
        let compressor = Compressor::default();
        let data = br#"[{"name":"game_launched"},{"name":"game_launched"}]"#.repeat(20);

        let compressed = compressor.compress(&data).unwrap();
        assert!(compressed.len() < data.len());

        let decompressed = compressor.decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn test_garbage_input_fails() {
        let compressor = Compressor::default();
        let result = compressor.decompress(b"definitely not zstd");
        assert!(matches!(result, Err(TelemetryError::CompressionFailed(_))));
    }

    #[test]
    fn test_level_clamped() {
        assert!(Compressor::new(1_000).level() <= *zstd::compression_level_range().end());
    }
}
