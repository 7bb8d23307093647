//! Semantic product search.
//!
//! The index is a long-lived snapshot of product embeddings. It is built on the first search and
//! replaced wholesale by [`EmbeddingIndex::spawn_rebuild`]; searches keep reading the old
//! snapshot until the new one is swapped in.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use tendero_core::catalog::infer_category;
use tendero_core::domain::product::{Product, ProductId};
use tendero_core::text::tokenize;
use tendero_db::{CatalogRepository, RepositoryError};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Feature-hashed bag of normalized tokens plus character trigrams, L2-normalized.
///
/// Trigrams let `extintores` land near `extintor` without a stemmer. Identical input always
/// produces identical vectors.
#[derive(Clone, Copy, Debug)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        for token in tokenize(text) {
            self.add_feature(&mut vector, &format!("w:{token}"), 1.0);
            let padded = format!("#{token}#").chars().collect::<Vec<_>>();
            for window in padded.windows(3) {
                let trigram = window.iter().collect::<String>();
                self.add_feature(&mut vector, &format!("c:{trigram}"), 0.5);
            }
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME))
}

fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(left, right)| left * right).sum()
}

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("catalog unavailable while building the embedding index: {0}")]
    Catalog(#[from] RepositoryError),
    #[error("embedding index rebuild task failed: {0}")]
    Rebuild(String),
}

#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Product ids ordered by similarity, best first, at most `top_k`.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ProductId>, VectorError>;
}

#[derive(Debug)]
pub struct IndexSnapshot {
    entries: Vec<(ProductId, Vec<f32>)>,
    pub built_at: DateTime<Utc>,
}

impl IndexSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn rank(&self, query: &[f32], top_k: usize) -> Vec<ProductId> {
        let mut scored = self
            .entries
            .iter()
            .map(|(id, embedding)| (*id, dot(query, embedding)))
            .filter(|(_, score)| *score > 0.0)
            .collect::<Vec<_>>();
        scored.sort_by(|(left_id, left), (right_id, right)| {
            right.partial_cmp(left).unwrap_or(Ordering::Equal).then_with(|| left_id.cmp(right_id))
        });
        scored.into_iter().take(top_k).map(|(id, _)| id).collect()
    }
}

fn embedding_text(product: &Product) -> String {
    format!("{} {} {}", product.name, product.description, infer_category(product))
}

pub struct EmbeddingIndex {
    catalog: Arc<dyn CatalogRepository>,
    embedder: Arc<dyn Embedder>,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    init: Mutex<()>,
}

impl EmbeddingIndex {
    pub fn new(catalog: Arc<dyn CatalogRepository>, embedder: Arc<dyn Embedder>) -> Self {
        Self { catalog, embedder, snapshot: RwLock::new(None), init: Mutex::new(()) }
    }

    async fn build(&self) -> Result<IndexSnapshot, VectorError> {
        let products = self.catalog.list_active_products().await?;
        let entries = products
            .iter()
            .map(|product| (product.id, self.embedder.embed(&embedding_text(product))))
            .collect::<Vec<_>>();

        tracing::info!(
            event_name = "vector.index.built",
            products = entries.len(),
            dimensions = self.embedder.dimensions(),
            "embedding index built"
        );
        Ok(IndexSnapshot { entries, built_at: Utc::now() })
    }

    /// Current snapshot, building it on first use. Concurrent first callers wait for a single
    /// build.
    pub async fn snapshot(&self) -> Result<Arc<IndexSnapshot>, VectorError> {
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            return Ok(snapshot.clone());
        }

        let _guard = self.init.lock().await;
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            return Ok(snapshot.clone());
        }
        let built = Arc::new(self.build().await?);
        *self.snapshot.write().await = Some(built.clone());
        Ok(built)
    }

    /// Rebuilds from the catalog off the request path. The write lock is held only for the swap.
    pub fn spawn_rebuild(self: &Arc<Self>) -> JoinHandle<Result<usize, VectorError>> {
        let index = Arc::clone(self);
        tokio::spawn(async move {
            let rebuilt = Arc::new(index.build().await.inspect_err(|error| {
                tracing::warn!(
                    event_name = "vector.index.rebuild_failed",
                    error = %error,
                    "embedding index rebuild failed; keeping previous snapshot"
                );
            })?);
            let size = rebuilt.len();
            *index.snapshot.write().await = Some(rebuilt);
            Ok(size)
        })
    }
}

#[async_trait]
impl VectorSearch for EmbeddingIndex {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ProductId>, VectorError> {
        let snapshot = self.snapshot().await?;
        let embedded = self.embedder.embed(query);
        if top_k == 0 || embedded.iter().all(|value| *value == 0.0) {
            return Ok(Vec::new());
        }
        Ok(snapshot.rank(&embedded, top_k))
    }
}
