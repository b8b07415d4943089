//! Byte-exact test vectors for the on-disk and on-wire formats.
//!
//! Brokers built from different code bases must agree on these bytes.
//! [`all_vectors_json`] exports them for use outside Rust.

use serde::{Deserialize, Serialize};

/// A named encoding and its expected bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description of the encoded value.
    pub description: String,
    /// Expected encoding (hex).
    pub expected_hex: String,
}

impl TestVector {
    fn new(id: &str, description: &str, expected_hex: &str) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            expected_hex: expected_hex.into(),
        }
    }

    /// Returns the expected bytes.
    pub fn expected_bytes(&self) -> Vec<u8> {
        decode_hex(&self.expected_hex)
    }
}

/// Decodes a hex string. Panics on malformed input.
pub fn decode_hex(hex: &str) -> Vec<u8> {
    assert!(hex.len() % 2 == 0, "odd-length hex string");
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).expect("invalid hex digit"))
        .collect()
}

/// Chunk framing vectors.
pub fn chunk_vectors() -> Vec<TestVector> {
    vec![
        TestVector::new(
            "chunk_basic",
            "chunk start=1 records=2 body=\"abc\"",
            "00 00000003 0000000000000001 00000002 616263",
        ),
        TestVector::new(
            "chunk_padded",
            "two padding bytes then chunk start=1 records=2 body=\"abc\"",
            "8080 00 00000003 0000000000000001 00000002 616263",
        ),
        TestVector::new(
            "chunk_empty_body",
            "chunk start=-1 records=1 empty body",
            "00 00000000 ffffffffffffffff 00000001",
        ),
    ]
    .into_iter()
    .map(compact)
    .collect()
}

/// Sparse index entry vectors.
pub fn index_vectors() -> Vec<TestVector> {
    vec![TestVector::new(
        "index_entry",
        "index entry offset=100 position=4096",
        "0000000000000064 0000000000001000",
    )]
    .into_iter()
    .map(compact)
    .collect()
}

/// Interbroker frame vectors.
pub fn interbroker_vectors() -> Vec<TestVector> {
    vec![
        TestVector::new(
            "data_request",
            "data request stream=7 segment=1024 token=-1 gen=2 topic=\"ev\" payload=\"xyz\"",
            "01 0007 03 0000001a 0000000000000400 ffffffffffffffff 00000002 02 6576 78797a",
        ),
        TestVector::new(
            "error_response",
            "error response stream=7 message=\"no\"",
            "01 0007 02 00000002 6e6f",
        ),
        TestVector::new(
            "data_response_ack",
            "data response ack stream=7",
            "01 0007 04 00000000",
        ),
        TestVector::new("startup", "startup stream=0", "01 0000 00 00000000"),
        TestVector::new("ready", "ready stream=0", "01 0000 01 00000000"),
    ]
    .into_iter()
    .map(compact)
    .collect()
}

fn compact(mut vector: TestVector) -> TestVector {
    vector.expected_hex.retain(|c| !c.is_whitespace());
    vector
}

/// Finds an interbroker vector by id.
pub fn interbroker_vector(id: &str) -> Option<TestVector> {
    interbroker_vectors().into_iter().find(|v| v.id == id)
}

/// All vectors as pretty-printed JSON.
pub fn all_vectors_json() -> String {
    let vectors = AllTestVectors {
        chunk: chunk_vectors(),
        index: index_vectors(),
        interbroker: interbroker_vectors(),
    };

    serde_json::to_string_pretty(&vectors).expect("Failed to serialize vectors")
}

#[derive(Serialize, Deserialize)]
struct AllTestVectors {
    chunk: Vec<TestVector>,
    index: Vec<TestVector>,
    interbroker: Vec<TestVector>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use seglog_chunk::{put_padding, Chunk};

    fn vector(vectors: Vec<TestVector>, id: &str) -> Vec<u8> {
        vectors
            .into_iter()
            .find(|v| v.id == id)
            .unwrap()
            .expected_bytes()
    }

    #[test]
    fn chunk_vectors_match_encoder() {
        let chunk = Chunk::new(1, 2, b"abc".to_vec()).unwrap();
        assert_eq!(chunk.to_bytes().to_vec(), vector(chunk_vectors(), "chunk_basic"));

        let mut padded = Vec::new();
        put_padding(&mut padded, 2);
        chunk.encode(&mut padded);
        assert_eq!(padded, vector(chunk_vectors(), "chunk_padded"));

        let empty = Chunk::new(-1, 1, Vec::<u8>::new()).unwrap();
        assert_eq!(empty.to_bytes().to_vec(), vector(chunk_vectors(), "chunk_empty_body"));
    }

    #[test]
    fn index_vector_layout() {
        let mut expected = 100i64.to_be_bytes().to_vec();
        expected.extend_from_slice(&4096u64.to_be_bytes());
        assert_eq!(expected, vector(index_vectors(), "index_entry"));
    }

    #[test]
    fn interbroker_vector_lengths() {
        let request = interbroker_vector("data_request").unwrap().expected_bytes();
        assert_eq!(request.len(), 8 + 21 + 2 + 3);
        assert_eq!(request[7] as usize, 21 + 2 + 3);
    }

    #[test]
    fn decode_hex_values() {
        assert_eq!(decode_hex(""), Vec::<u8>::new());
        assert_eq!(decode_hex("00ff10"), vec![0x00, 0xFF, 0x10]);
    }

    #[test]
    fn vectors_export_as_json() {
        let json = all_vectors_json();
        assert!(json.contains("\"chunk_basic\""));
        assert!(json.contains("\"data_request\""));

        let parsed: AllTestVectors = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.interbroker.len(), interbroker_vectors().len());
    }
}
