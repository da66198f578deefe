//! Embedding byte codec and vector math helpers.
//!
//! Vectors are persisted as raw little-endian f32 so that a re-submitted
//! vector is bit-identical to its stored copy and is always its own nearest
//! neighbor.

use ndarray::Array1;

/// Encode a float vector as little-endian f32 bytes.
pub fn encode_f32(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian f32 bytes back into a vector.
pub fn decode_f32(bytes: &[u8]) -> Array1<f32> {
    Array1::from_iter(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
    )
}

/// L2-normalize in place. A zero vector is left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 1e-9 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}
