//! 归档编码
//!
//! 归档内容为日志原始字节经 gzip 压缩后的 base64 文本

use crate::error::LogStoreError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// 压缩并编码日志内容
pub fn encode(content: &[u8]) -> std::io::Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

/// 解码并解压归档内容，得到与压缩前逐字节一致的数据
pub fn decode(encoded: &str) -> Result<Vec<u8>, LogStoreError> {
    let compressed = STANDARD.decode(encoded.trim())?;
    let mut decoder = MultiGzDecoder::new(compressed.as_slice());
    let mut content = Vec::new();
    decoder.read_to_end(&mut content)?;
    Ok(content)
}
