//! Vector blob codec.
//!
//! Converts between in-memory `f32` vectors and the little-endian blob
//! form stored in the vector columns. The round trip is bit-exact, well
//! inside the 7-significant-digit fidelity requirement.

use mythos_types::error::StoreError;

/// Encode a vector of the configured dimension as a little-endian f32 blob.
pub fn encode_vector(vector: &[f32], dim: usize) -> Result<Vec<u8>, StoreError> {
    if vector.len() != dim {
        return Err(StoreError::DimensionMismatch {
            expected: dim,
            actual: vector.len(),
        });
    }
    let mut blob = Vec::with_capacity(vector.len() * size_of::<f32>());
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    Ok(blob)
}

/// Decode a little-endian f32 blob back into a vector of the configured
/// dimension.
pub fn decode_vector(blob: &[u8], dim: usize) -> Result<Vec<f32>, StoreError> {
    if blob.len() != dim * size_of::<f32>() {
        return Err(StoreError::DimensionMismatch {
            expected: dim,
            actual: blob.len() / size_of::<f32>(),
        });
    }
    Ok(blob
        .chunks_exact(size_of::<f32>())
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_is_bit_exact() {
        let vector = vec![0.123_456_7f32, -1.5, f32::MIN_POSITIVE, 1e30, 0.0];
        let blob = encode_vector(&vector, 5).unwrap();
        let decoded = decode_vector(&blob, 5).unwrap();
        assert_eq!(vector, decoded);
    }

    #[test]
    fn test_encode_rejects_wrong_dimension() {
        let err = encode_vector(&[0.0, 1.0], 4).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch { expected: 4, actual: 2 }
        ));
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let blob = encode_vector(&[0.0; 4], 4).unwrap();
        assert!(decode_vector(&blob, 3).is_err());
        assert!(decode_vector(&blob[1..], 4).is_err());
    }

    #[test]
    fn test_blob_layout_is_little_endian() {
        let blob = encode_vector(&[1.0], 1).unwrap();
        assert_eq!(blob, 1.0f32.to_le_bytes().to_vec());
    }
}
