//! Streaming top-k scan (component H): score a query record against a corpus
//! of on-disk `.rag` files without loading whole files when it can be
//! avoided. Jaccard/Hamming only ever touch the header; Cosine additionally
//! reads the embeddings matrix when the candidate carries one.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::BufReader;

use crate::error::{RagFileError, Result};
use crate::io;
use crate::record::RagFile;
use crate::similarity::{self, ReduceMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMethod {
    Jaccard,
    Hamming,
    Cosine,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanMatch {
    pub score: f64,
    pub identifier: String,
}

/// A heap entry with inverted `Ord` so a max-heap built from it behaves as a
/// min-heap by score: `BinaryHeap::peek()` returns the *lowest*-scoring
/// candidate currently held, which is exactly the one to evict when a better
/// candidate shows up. Ties broken by insertion order (`seq`) so the scan is
/// stable across otherwise-equal scores.
#[derive(Debug, Clone, PartialEq)]
struct HeapEntry {
    score: f64,
    seq: u64,
    identifier: String,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Score a single on-disk candidate against `query`, reading only as much of
/// the file as the method requires.
fn score_one(query: &RagFile, path: &str, method: ScanMethod) -> Result<f64> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let header = io::read_header_from(&mut reader)?;

    match method {
        ScanMethod::Jaccard => similarity::jaccard(&query.header.minhash, &header.minhash),
        ScanMethod::Hamming => {
            if !query.header.flags.has_scan_vector() || !header.flags.has_scan_vector() {
                return Err(RagFileError::DimensionMismatch(
                    "hamming: both records must carry a scan vector".into(),
                ));
            }
            if query.header.scan_vector_dim != header.scan_vector_dim {
                return Err(RagFileError::DimensionMismatch(format!(
                    "hamming: scan_vector_dim differs ({} vs {})",
                    query.header.scan_vector_dim, header.scan_vector_dim
                )));
            }
            similarity::hamming(&query.header.scan_vector, &header.scan_vector, header.dense_vector_dim)
        }
        ScanMethod::Cosine => {
            let query_dense = query.header.dense_vector.to_f32();
            if header.flags.has_embeddings() {
                let matrix = io::read_embeddings_after_header(&mut reader, &header)?;
                match matrix {
                    Some(rows) => similarity::cosine_matrix(&query_dense, &rows, ReduceMode::Max),
                    None => similarity::cosine(&query_dense, &header.dense_vector.to_f32()),
                }
            } else {
                similarity::cosine(&query_dense, &header.dense_vector.to_f32())
            }
        }
    }
}

/// Scan `identifiers` (file paths), keeping the `top_k` highest-scoring
/// matches against `query`. Per-candidate read/score errors are logged and
/// skipped; an `Err` yielded by the iterator itself is treated as
/// catastrophic and aborts the whole scan with [`RagFileError::ScanAborted`].
/// `cancelled` is polled between candidates for cooperative cancellation.
pub fn match_top_k<I>(
    query: &RagFile,
    identifiers: I,
    top_k: usize,
    method: ScanMethod,
    mut cancelled: impl FnMut() -> bool,
) -> Result<Vec<ScanMatch>>
where
    I: Iterator<Item = std::result::Result<String, RagFileError>>,
{
    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(top_k.max(1));
    let mut seq = 0u64;

    for item in identifiers {
        if cancelled() {
            break;
        }
        let identifier = item.map_err(|e| RagFileError::ScanAborted(e.to_string()))?;

        let score = match score_one(query, &identifier, method) {
            Ok(s) => s,
            Err(e) => {
                crate::debug_log!("[ragfile] skipping {identifier}: {e}");
                continue;
            }
        };

        seq += 1;
        let entry = HeapEntry { score, seq, identifier };

        if top_k == 0 {
            continue;
        }
        if heap.len() < top_k {
            heap.push(entry);
        } else if let Some(worst) = heap.peek() {
            if entry.score > worst.score {
                heap.pop();
                heap.push(entry);
            }
        }
    }

    let mut matches: Vec<ScanMatch> = heap
        .into_iter()
        .map(|e| ScanMatch {
            score: e.score,
            identifier: e.identifier,
        })
        .collect();
    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuilderConfig;
    use crate::record::EmbeddingInput;
    use std::io::Write as _;

    fn write_record(path: &std::path::Path, text: &str, dense: Vec<f32>) {
        let cfg = BuilderConfig::default();
        let rf = RagFile::new(
            text,
            &[1, 2, 3, 4],
            EmbeddingInput::Single(dense),
            "tok",
            "emb",
            1,
            None,
            &cfg,
        )
        .unwrap();
        let bytes = crate::io::dumps(&rf).unwrap();
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(&bytes).unwrap();
    }

    #[test]
    fn top_k_returns_best_matches_sorted_descending() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = BuilderConfig::default();

        let query = RagFile::new(
            "query text",
            &[1, 2, 3, 4],
            EmbeddingInput::Single(vec![1.0, 0.0, 0.0, 0.0]),
            "tok",
            "emb",
            1,
            None,
            &cfg,
        )
        .unwrap();

        let close_path = dir.path().join("close.rag");
        write_record(&close_path, "query text", vec![1.0, 0.0, 0.0, 0.0]);
        let far_path = dir.path().join("far.rag");
        write_record(&far_path, "completely different content", vec![0.0, 1.0, 0.0, 0.0]);

        let identifiers = vec![
            Ok(close_path.to_str().unwrap().to_string()),
            Ok(far_path.to_str().unwrap().to_string()),
        ]
        .into_iter();

        let matches = match_top_k(&query, identifiers, 2, ScanMethod::Cosine, || false).unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches[0].score >= matches[1].score);
        assert_eq!(matches[0].identifier, close_path.to_str().unwrap());
    }

    #[test]
    fn top_k_caps_result_count() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = BuilderConfig::default();
        let query = RagFile::new(
            "q",
            &[1, 2, 3],
            EmbeddingInput::Single(vec![1.0, 0.0]),
            "tok",
            "emb",
            1,
            None,
            &cfg,
        )
        .unwrap();

        let mut identifiers = Vec::new();
        for i in 0..5 {
            let path = dir.path().join(format!("doc{i}.rag"));
            write_record(&path, "some doc text", vec![1.0, 0.0]);
            identifiers.push(Ok(path.to_str().unwrap().to_string()));
        }

        let matches = match_top_k(&query, identifiers.into_iter(), 3, ScanMethod::Cosine, || false).unwrap();
        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn per_candidate_errors_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = BuilderConfig::default();
        let query = RagFile::new(
            "q",
            &[1, 2, 3],
            EmbeddingInput::Single(vec![1.0, 0.0]),
            "tok",
            "emb",
            1,
            None,
            &cfg,
        )
        .unwrap();

        let good_path = dir.path().join("good.rag");
        write_record(&good_path, "good doc", vec![1.0, 0.0]);
        let missing_path = dir.path().join("missing.rag");

        let identifiers = vec![
            Ok(missing_path.to_str().unwrap().to_string()),
            Ok(good_path.to_str().unwrap().to_string()),
        ]
        .into_iter();

        let matches = match_top_k(&query, identifiers, 5, ScanMethod::Cosine, || false).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].identifier, good_path.to_str().unwrap());
    }

    #[test]
    fn iterator_error_aborts_the_whole_scan() {
        let cfg = BuilderConfig::default();
        let query = RagFile::new(
            "q",
            &[1, 2, 3],
            EmbeddingInput::Single(vec![1.0, 0.0]),
            "tok",
            "emb",
            1,
            None,
            &cfg,
        )
        .unwrap();

        let identifiers = vec![Err(RagFileError::ScanAborted("walker died".into()))].into_iter();
        let result = match_top_k(&query, identifiers, 5, ScanMethod::Cosine, || false);
        assert!(matches!(result, Err(RagFileError::ScanAborted(_))));
    }
}
