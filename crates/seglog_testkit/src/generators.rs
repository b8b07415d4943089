//! Property-based test generators using proptest.
//!
//! Strategies here keep the segment invariants: chunks are contiguous in
//! logical offset and every chunk holds at least one record.

use proptest::prelude::*;
use seglog_chunk::{put_padding, Chunk};

/// A generated run of chunks plus the padding written before each one.
#[derive(Debug, Clone)]
pub struct GeneratedRun {
    /// Chunks in offset order.
    pub chunks: Vec<Chunk>,
    /// Padding bytes written before each chunk.
    pub paddings: Vec<usize>,
}

impl GeneratedRun {
    /// Encodes the run as it would appear in a segment file.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for (chunk, &padding) in self.chunks.iter().zip(&self.paddings) {
            put_padding(&mut buf, padding);
            chunk.encode(&mut buf);
        }
        buf
    }

    /// First logical offset covered by the run.
    pub fn first_offset(&self) -> i64 {
        self.chunks.first().map_or(0, |c| c.header().start)
    }

    /// Logical offset one past the last record of the run.
    pub fn end_offset(&self) -> i64 {
        self.chunks.last().map_or(0, |c| c.header().end())
    }

    /// Index of the chunk holding `offset`.
    pub fn chunk_holding(&self, offset: i64) -> Option<usize> {
        self.chunks.iter().position(|c| c.header().contains(offset))
    }
}

/// Strategy for chunk bodies.
pub fn body_strategy(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Strategy for a contiguous chunk run of 1 to `max_chunks` chunks.
///
/// Each chunk holds 1 to 8 records, a body of up to `max_body` bytes and
/// is preceded by up to `max_padding` padding bytes.
pub fn chunk_run_strategy(
    max_chunks: usize,
    max_body: usize,
    max_padding: usize,
) -> impl Strategy<Value = GeneratedRun> {
    let chunk = (1u32..=8, body_strategy(max_body), 0..=max_padding);
    (
        -1_000_000i64..1_000_000,
        prop::collection::vec(chunk, 1..=max_chunks),
    )
        .prop_map(|(first, specs)| {
            let mut start = first;
            let mut chunks = Vec::with_capacity(specs.len());
            let mut paddings = Vec::with_capacity(specs.len());
            for (records, body, padding) in specs {
                chunks.push(Chunk::new(start, records, body).expect("generated chunk is valid"));
                paddings.push(padding);
                start += i64::from(records);
            }
            GeneratedRun { chunks, paddings }
        })
}

/// Strategy for topic names of 0 to 255 ASCII bytes.
pub fn topic_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9_.-]{0,255}").expect("Invalid regex")
}

/// Strategy for replication payloads, from empty to above 64 KiB.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        Just(Vec::new()),
        prop::collection::vec(any::<u8>(), 1..512),
        prop::collection::vec(any::<u8>(), 64 * 1024 + 1..64 * 1024 + 64),
    ]
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seglog_chunk::ChunkRun;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn chunk_runs_are_contiguous(run in chunk_run_strategy(16, 64, 32)) {
            for pair in run.chunks.windows(2) {
                prop_assert_eq!(pair[0].header().end(), pair[1].header().start);
            }
            prop_assert!(run.chunks.iter().all(|c| c.header().record_length >= 1));
        }

        #[test]
        fn encoded_runs_decode(run in chunk_run_strategy(8, 32, 600)) {
            let bytes = run.encode();
            let decoded: Vec<_> = ChunkRun::new(&bytes).collect::<Result<_, _>>().unwrap();
            prop_assert_eq!(decoded.len(), run.chunks.len());
        }

        #[test]
        fn topic_names_fit_length_byte(name in topic_name_strategy()) {
            prop_assert!(name.len() <= 255);
        }
    }

    #[test]
    fn chunk_holding_finds_offsets() {
        let run = GeneratedRun {
            chunks: vec![
                Chunk::new(10, 2, Vec::<u8>::new()).unwrap(),
                Chunk::new(12, 3, Vec::<u8>::new()).unwrap(),
            ],
            paddings: vec![0, 0],
        };
        assert_eq!(run.first_offset(), 10);
        assert_eq!(run.end_offset(), 15);
        assert_eq!(run.chunk_holding(11), Some(0));
        assert_eq!(run.chunk_holding(14), Some(1));
        assert_eq!(run.chunk_holding(15), None);
    }
}
