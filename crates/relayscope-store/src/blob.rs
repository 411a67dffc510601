/// Encodes a MinHash signature as a little-endian byte BLOB (8 bytes per
/// coordinate) rather than a JSON array, so Jaccard computation downstream
/// never pays a parse cost.
pub fn encode_signature(signature: &[u64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(signature.len() * 8);
    for word in signature {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes
}

pub fn decode_signature(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(8)
        .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_signature() {
        let signature: Vec<u64> = (0..512).map(|i| i * 7919).collect();
        let bytes = encode_signature(&signature);
        assert_eq!(bytes.len(), 512 * 8);
        assert_eq!(decode_signature(&bytes), signature);
    }
}
