//! Persistent flat similarity index over L2-normalized vectors.
//!
//! Vectors are normalized to unit length exactly once on the way in, so the
//! inner product against a normalized query equals cosine similarity. The
//! index persists as two sibling files (a vector file and a metadata file)
//! written atomically together; a missing or corrupt pair reinitializes the
//! index empty instead of erroring the caller.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;

use crate::types::{Chunk, PipelineError, SearchHit};

const VECTOR_FILE: &str = "vectors.json";
const METADATA_FILE: &str = "metadata.json";

/// Index size and shape, surfaced for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub count: usize,
    pub dimension: usize,
}

#[derive(Default, Serialize, Deserialize)]
struct VectorFile {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

#[derive(Default, Serialize, Deserialize)]
struct MetadataFile {
    entries: Vec<Chunk>,
}

#[derive(Default)]
struct IndexState {
    vectors: Vec<Vec<f32>>,
    metadata: Vec<Chunk>,
    id_to_offset: HashMap<String, usize>,
}

/// Append-only vector store with nearest-neighbor search and file
/// persistence.
///
/// Mutation (`add`, `save`, `clear`) is serialized through the write half of
/// the internal lock; `search` and `stats` take the read half and may proceed
/// concurrently with each other.
pub struct SimilarityIndex {
    dir: PathBuf,
    dimension: usize,
    state: RwLock<IndexState>,
}

impl SimilarityIndex {
    /// Opens an index rooted at `dir`, loading any persisted state.
    ///
    /// A missing or corrupt file pair is recovered by starting empty; a
    /// corrupt pair is logged as data loss.
    pub async fn open(dir: impl Into<PathBuf>, dimension: usize) -> Result<Self, PipelineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        let index = Self {
            dir,
            dimension,
            state: RwLock::new(IndexState::default()),
        };
        index.load().await;
        Ok(index)
    }

    /// Appends `(vector, chunk)` pairs in input order and returns how many
    /// were stored. Offsets are assigned contiguously from the current count.
    pub async fn add(
        &self,
        vectors: Vec<Vec<f32>>,
        chunks: Vec<Chunk>,
    ) -> Result<usize, PipelineError> {
        if vectors.len() != chunks.len() {
            return Err(PipelineError::Index(format!(
                "vector/metadata length mismatch: {} vs {}",
                vectors.len(),
                chunks.len()
            )));
        }
        // Validate the whole batch up front so a failed add leaves no
        // partial insertion behind.
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != self.dimension) {
            return Err(PipelineError::Index(format!(
                "expected dimension {}, got {}",
                self.dimension,
                bad.len()
            )));
        }
        let added = vectors.len();
        let mut state = self.state.write().await;
        for (mut vector, chunk) in vectors.into_iter().zip(chunks) {
            normalize_l2(&mut vector);
            let offset = state.vectors.len();
            state.id_to_offset.insert(chunk.id.clone(), offset);
            state.vectors.push(vector);
            state.metadata.push(chunk);
        }
        tracing::info!(added, total = state.vectors.len(), "added vectors to index");
        Ok(added)
    }

    /// Returns at most `min(k, count)` hits ordered by descending cosine
    /// similarity. An empty index yields an empty result set.
    pub async fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let state = self.state.read().await;
        if state.vectors.is_empty() || k == 0 {
            return Vec::new();
        }
        let mut query = query.to_vec();
        normalize_l2(&mut query);

        let mut scored: Vec<(usize, f32)> = state
            .vectors
            .iter()
            .enumerate()
            .map(|(offset, vector)| (offset, dot(&query, vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k.min(state.vectors.len()));

        scored
            .into_iter()
            .map(|(offset, score)| SearchHit {
                chunk: state.metadata[offset].clone(),
                score,
            })
            .collect()
    }

    /// Persists the vector file and metadata file together.
    ///
    /// Each file is written to a `.tmp` sibling and renamed into place,
    /// vectors first and metadata last, so a crash between writes leaves the
    /// previous consistent pair (or a mismatched pair that `load` rejects).
    pub async fn save(&self) -> Result<(), PipelineError> {
        let state = self.state.write().await;
        let vector_payload = serde_json::to_vec(&VectorFile {
            dimension: self.dimension,
            vectors: state.vectors.clone(),
        })
        .map_err(|err| PipelineError::Index(err.to_string()))?;
        let metadata_payload = serde_json::to_vec(&MetadataFile {
            entries: state.metadata.clone(),
        })
        .map_err(|err| PipelineError::Index(err.to_string()))?;

        write_atomic(&self.dir.join(VECTOR_FILE), &vector_payload).await?;
        write_atomic(&self.dir.join(METADATA_FILE), &metadata_payload).await?;
        tracing::info!(count = state.vectors.len(), "saved index");
        Ok(())
    }

    /// Replaces any existing state with an empty index and persists it.
    pub async fn clear(&self) -> Result<(), PipelineError> {
        {
            let mut state = self.state.write().await;
            *state = IndexState::default();
        }
        self.save().await
    }

    pub async fn stats(&self) -> IndexStats {
        let state = self.state.read().await;
        IndexStats {
            count: state.vectors.len(),
            dimension: self.dimension,
        }
    }

    async fn load(&self) {
        let vector_path = self.dir.join(VECTOR_FILE);
        let metadata_path = self.dir.join(METADATA_FILE);
        if !vector_path.exists() || !metadata_path.exists() {
            tracing::info!(dir = %self.dir.display(), "no persisted index, starting empty");
            return;
        }
        match read_state(&vector_path, &metadata_path, self.dimension).await {
            Ok(state) => {
                let count = state.vectors.len();
                *self.state.write().await = state;
                tracing::info!(count, "loaded persisted index");
            }
            Err(reason) => {
                tracing::warn!(%reason, "persisted index unreadable, reinitializing empty (data loss)");
            }
        }
    }
}

async fn read_state(
    vector_path: &Path,
    metadata_path: &Path,
    dimension: usize,
) -> Result<IndexState, String> {
    let vector_raw = fs::read(vector_path).await.map_err(|err| err.to_string())?;
    let metadata_raw = fs::read(metadata_path).await.map_err(|err| err.to_string())?;
    let vectors: VectorFile = serde_json::from_slice(&vector_raw).map_err(|err| err.to_string())?;
    let metadata: MetadataFile =
        serde_json::from_slice(&metadata_raw).map_err(|err| err.to_string())?;

    if vectors.dimension != dimension {
        return Err(format!(
            "persisted dimension {} does not match configured {dimension}",
            vectors.dimension
        ));
    }
    if vectors.vectors.len() != metadata.entries.len() {
        return Err(format!(
            "vector count {} does not match metadata count {}",
            vectors.vectors.len(),
            metadata.entries.len()
        ));
    }

    let id_to_offset = metadata
        .entries
        .iter()
        .enumerate()
        .map(|(offset, chunk)| (chunk.id.clone(), offset))
        .collect();
    Ok(IndexState {
        vectors: vectors.vectors,
        metadata: metadata.entries,
        id_to_offset,
    })
}

async fn write_atomic(path: &Path, payload: &[u8]) -> Result<(), PipelineError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, payload).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

/// Scales a vector to unit L2 norm; the zero vector is left untouched.
fn normalize_l2(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn chunk(id: &str, index: usize) -> Chunk {
        Chunk {
            id: id.to_string(),
            page_id: None,
            url: "https://x.com/p".into(),
            title: "T".into(),
            content: format!("content for {id}"),
            index,
            word_count: 3,
        }
    }

    #[tokio::test]
    async fn search_orders_by_descending_similarity() {
        let dir = tempdir().unwrap();
        let index = SimilarityIndex::open(dir.path(), 3).await.unwrap();
        index
            .add(
                vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.7, 0.7, 0.0]],
                vec![chunk("a", 0), chunk("b", 1), chunk("c", 2)],
            )
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0], 10).await;
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].chunk.id, "a");
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn empty_index_returns_empty_results() {
        let dir = tempdir().unwrap();
        let index = SimilarityIndex::open(dir.path(), 4).await.unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 5).await.is_empty());
        assert_eq!(index.stats().await.count, 0);
    }

    #[tokio::test]
    async fn unnormalized_inputs_score_as_cosine() {
        let dir = tempdir().unwrap();
        let index = SimilarityIndex::open(dir.path(), 2).await.unwrap();
        // Large magnitudes must not inflate scores.
        index
            .add(vec![vec![100.0, 0.0]], vec![chunk("a", 0)])
            .await
            .unwrap();
        let hits = index.search(&[0.5, 0.0], 1).await;
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        {
            let index = SimilarityIndex::open(dir.path(), 2).await.unwrap();
            index
                .add(
                    vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                    vec![chunk("a", 0), chunk("b", 1)],
                )
                .await
                .unwrap();
            index.save().await.unwrap();
        }

        let reloaded = SimilarityIndex::open(dir.path(), 2).await.unwrap();
        assert_eq!(reloaded.stats().await, IndexStats { count: 2, dimension: 2 });
        let hits = reloaded.search(&[1.0, 0.1], 2).await;
        assert_eq!(hits[0].chunk.id, "a");
        assert_eq!(hits[1].chunk.id, "b");
    }

    #[tokio::test]
    async fn corrupt_metadata_reinitializes_empty() {
        let dir = tempdir().unwrap();
        {
            let index = SimilarityIndex::open(dir.path(), 2).await.unwrap();
            index
                .add(vec![vec![1.0, 0.0]], vec![chunk("a", 0)])
                .await
                .unwrap();
            index.save().await.unwrap();
        }
        std::fs::write(dir.path().join(METADATA_FILE), b"{not json").unwrap();

        let reloaded = SimilarityIndex::open(dir.path(), 2).await.unwrap();
        assert_eq!(reloaded.stats().await.count, 0);
    }

    #[tokio::test]
    async fn mismatched_dimension_rejected() {
        let dir = tempdir().unwrap();
        let index = SimilarityIndex::open(dir.path(), 3).await.unwrap();
        let err = index
            .add(vec![vec![1.0, 0.0]], vec![chunk("a", 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Index(_)));
    }

    #[tokio::test]
    async fn failed_add_inserts_nothing_from_the_batch() {
        let dir = tempdir().unwrap();
        let index = SimilarityIndex::open(dir.path(), 2).await.unwrap();
        // Valid vector ahead of the bad one must not survive the rejection.
        let err = index
            .add(
                vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]],
                vec![chunk("a", 0), chunk("b", 1)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Index(_)));
        assert_eq!(index.stats().await.count, 0);
        assert!(index.search(&[1.0, 0.0], 5).await.is_empty());
    }

    #[tokio::test]
    async fn clear_persists_empty_state() {
        let dir = tempdir().unwrap();
        let index = SimilarityIndex::open(dir.path(), 2).await.unwrap();
        index
            .add(vec![vec![1.0, 0.0]], vec![chunk("a", 0)])
            .await
            .unwrap();
        index.clear().await.unwrap();
        assert_eq!(index.stats().await.count, 0);

        let reloaded = SimilarityIndex::open(dir.path(), 2).await.unwrap();
        assert_eq!(reloaded.stats().await.count, 0);
    }
}
