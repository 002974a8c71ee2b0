use serde::Deserialize;
use std::collections::HashMap;

use super::colour::Colour;
use super::types::{CanvasMetadata, DecodeError, User};

#[derive(Deserialize)]
struct RawMetadata {
    #[serde(default)]
    palette: Vec<u32>,
    width: u32,
    height: u32,
}

/// Parse a snapshot's `metadata.json`.
pub fn parse_metadata(bytes: &[u8]) -> Result<CanvasMetadata, DecodeError> {
    let raw: RawMetadata =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::InvalidMetadata(e.to_string()))?;
    let palette = raw.palette.into_iter().map(Colour::from_packed).collect();
    Ok(CanvasMetadata::new(raw.width, raw.height, palette))
}

/// Check that a raw canvas holds one palette index per pixel.
pub fn parse_canvas(metadata: &CanvasMetadata, bytes: &[u8]) -> Result<(), DecodeError> {
    let expected = metadata.buffer_len(1)?;
    if bytes.len() != expected {
        return Err(DecodeError::SizeMismatch {
            what: "canvas",
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Decode a placer map: one big-endian user id per pixel.
pub fn parse_placers(metadata: &CanvasMetadata, bytes: &[u8]) -> Result<Vec<u32>, DecodeError> {
    let expected = metadata.buffer_len(4)?;
    if bytes.len() != expected {
        return Err(DecodeError::SizeMismatch {
            what: "placers",
            expected,
            actual: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Parse a `users/{id}` response.
pub fn parse_user(int_id: u32, bytes: &[u8]) -> Result<User, DecodeError> {
    let mut user: User =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::InvalidUser(e.to_string()))?;
    user.int_id = int_id;
    Ok(user)
}

/// Count pixels per placer and return the `max` biggest as `(id, count)`.
///
/// Ties go to the lower id.
pub fn count_top_placers(placers: &[u32], max: usize) -> Vec<(u32, u32)> {
    let mut counts: HashMap<u32, u32> = HashMap::new();
    for &id in placers {
        *counts.entry(id).or_insert(0) += 1;
    }

    let mut ranked: Vec<(u32, u32)> = counts.into_iter().collect();
    ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(max);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metadata() {
        let json = br#"{"palette": [4282712319, 255], "width": 2, "height": 3}"#;
        let metadata = parse_metadata(json).unwrap();
        assert_eq!(metadata.width, 2);
        assert_eq!(metadata.height, 3);
        assert_eq!(metadata.palette[0], Colour::rgba(0xFF, 0x45, 0x00, 0xFF));
        assert_eq!(metadata.palette[1], Colour::rgba(0, 0, 0, 0xFF));
    }

    #[test]
    fn test_parse_metadata_without_palette() {
        let metadata = parse_metadata(br#"{"width": 4, "height": 4}"#).unwrap();
        assert!(metadata.palette.is_empty());
    }

    #[test]
    fn test_parse_metadata_invalid() {
        let result = parse_metadata(b"not json");
        assert!(matches!(result, Err(DecodeError::InvalidMetadata(_))));
    }

    #[test]
    fn test_parse_canvas_size_mismatch() {
        let metadata = CanvasMetadata::new(2, 2, Vec::new());
        assert!(parse_canvas(&metadata, &[0, 1, 2, 3]).is_ok());

        let err = parse_canvas(&metadata, &[0, 1, 2]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::SizeMismatch {
                expected: 4,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_placers_big_endian() {
        let metadata = CanvasMetadata::new(2, 1, Vec::new());
        let bytes = [0, 0, 0, 7, 0, 0, 1, 0];
        assert_eq!(parse_placers(&metadata, &bytes).unwrap(), vec![7, 256]);

        assert!(parse_placers(&metadata, &bytes[..7]).is_err());
    }

    #[test]
    fn test_oversized_dimensions_are_invalid_metadata() {
        let metadata = CanvasMetadata::new(u32::MAX, u32::MAX, Vec::new());

        let result = parse_placers(&metadata, &[0; 4]);
        assert!(matches!(result, Err(DecodeError::InvalidMetadata(_))));

        let result = parse_canvas(&CanvasMetadata::new(u32::MAX, u32::MAX, Vec::new()), &[0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_user() {
        let json = br#"{"chatName": "zekiah", "lastJoined": 1704298864, "pixelsPlaced": 42, "playTimeSeconds": 600}"#;
        let user = parse_user(9, json).unwrap();
        assert_eq!(user.int_id, 9);
        assert_eq!(user.chat_name.as_deref(), Some("zekiah"));
        assert_eq!(user.pixels_placed, 42);
    }

    #[test]
    fn test_count_top_placers_orders_by_count_then_id() {
        let placers = [3, 1, 1, 2, 2, 3, 3, 4];
        let top = count_top_placers(&placers, 3);
        assert_eq!(top, vec![(3, 3), (1, 2), (2, 2)]);
    }

    #[test]
    fn test_count_top_placers_empty() {
        assert!(count_top_placers(&[], 10).is_empty());
        assert!(count_top_placers(&[1, 2], 0).is_empty());
    }
}
