//! Reversal of the HDF5 filter pipeline for a single stored chunk.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::index::Codec;

/// Undo `filters` (listed in write order) on one chunk's stored bytes.
///
/// Filters whose bit is set in `filter_mask` were skipped when the chunk was
/// written and are skipped here too.
pub fn decode_chunk(stored: Vec<u8>, filters: &[Codec], filter_mask: u32) -> Result<Vec<u8>, String> {
    let mut data = stored;

    for (i, codec) in filters.iter().enumerate().rev() {
        if i < 32 && filter_mask & (1 << i) != 0 {
            continue;
        }
        data = match codec {
            Codec::Zlib { .. } => inflate(&data)?,
            Codec::Shuffle { element_size } => unshuffle(&data, *element_size),
            Codec::Fletcher32 => strip_checksum(data)?,
            Codec::Unsupported { name } => {
                return Err(format!("unsupported filter '{}'", name));
            }
        };
    }

    Ok(data)
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(data.len() * 4);
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| format!("zlib decode failed: {}", e))?;
    Ok(out)
}

/// Inverse of the HDF5 byte shuffle.
///
/// Byte `b` of element `i` was stored at `b * n + i`. Bytes past the last
/// whole element were left in place by the encoder.
pub fn unshuffle(data: &[u8], element_size: usize) -> Vec<u8> {
    if element_size <= 1 || data.len() < element_size {
        return data.to_vec();
    }

    let n = data.len() / element_size;
    let mut out = vec![0u8; data.len()];
    for b in 0..element_size {
        let plane = &data[b * n..(b + 1) * n];
        for (i, &byte) in plane.iter().enumerate() {
            out[i * element_size + b] = byte;
        }
    }
    let whole = n * element_size;
    out[whole..].copy_from_slice(&data[whole..]);
    out
}

fn strip_checksum(mut data: Vec<u8>) -> Result<Vec<u8>, String> {
    if data.len() < 4 {
        return Err("chunk shorter than its fletcher32 checksum".to_string());
    }
    data.truncate(data.len() - 4);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn shuffle(data: &[u8], element_size: usize) -> Vec<u8> {
        let n = data.len() / element_size;
        let mut out = data.to_vec();
        for i in 0..n {
            for b in 0..element_size {
                out[b * n + i] = data[i * element_size + b];
            }
        }
        out
    }

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::new(4));
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_unshuffle_with_trailing_bytes() {
        let raw: Vec<u8> = (0u8..14).collect();
        let shuffled = shuffle(&raw, 4);
        assert_eq!(&shuffled[12..], &[12, 13]);
        assert_eq!(unshuffle(&shuffled, 4), raw);
    }

    #[test]
    fn test_shuffle_then_deflate_pipeline() {
        let raw: Vec<u8> = [1.5f32, 2.5, -3.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let stored = deflate(&shuffle(&raw, 4));
        let filters = [Codec::Shuffle { element_size: 4 }, Codec::Zlib { level: 4 }];

        assert_eq!(decode_chunk(stored, &filters, 0).unwrap(), raw);
    }

    #[test]
    fn test_filter_mask_skips_stage() {
        let raw: Vec<u8> = (0u8..8).collect();
        let stored = shuffle(&raw, 4);
        let filters = [Codec::Shuffle { element_size: 4 }, Codec::Zlib { level: 4 }];

        assert_eq!(decode_chunk(stored, &filters, 0b10).unwrap(), raw);
    }

    #[test]
    fn test_fletcher32_stripped() {
        let stored = vec![1, 2, 3, 4, 0xde, 0xad, 0xbe, 0xef];
        assert_eq!(
            decode_chunk(stored, &[Codec::Fletcher32], 0).unwrap(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn test_unsupported_filter_errors() {
        let filters = [Codec::Unsupported {
            name: "szip".to_string(),
        }];
        let err = decode_chunk(vec![0; 8], &filters, 0).unwrap_err();
        assert!(err.contains("szip"));
    }
}
