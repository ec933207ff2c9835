//! Project-scoped knowledge store over a similarity-search service.
//!
//! The store keeps a JSON mirror of every entry keyed by `(kind, name)` and,
//! when an index and embedding client are configured, upserts an embedding
//! per entry. Queries are similarity-ranked when the index is reachable and
//! fall back to an unranked kind-filtered slice of the mirror otherwise —
//! reduced precision, not a failure.

use crate::lore::{LoreEntry, LoreKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Payload stored alongside each vector in the index. The full entry lives
/// in the mirror; the index only needs enough to find it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPayload {
    pub kind: LoreKind,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: IndexPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexMatch {
    pub score: f32,
    pub payload: IndexPayload,
}

/// The external similarity-search service.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    async fn upsert(&self, namespace: &str, points: Vec<IndexPoint>) -> Result<()>;

    async fn search(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
        kind_filter: Option<LoreKind>,
    ) -> Result<Vec<IndexMatch>>;
}

/// Produces embeddings for entry renderings and query text.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// A lore entry with its similarity score. Fallback results carry 0.0.
#[derive(Debug, Clone)]
pub struct ScoredLore {
    pub entry: LoreEntry,
    pub score: f32,
}

/// Project-scoped store. Cheap to share behind an `Arc`.
pub struct LoreStore {
    namespace: String,
    mirror: Mutex<HashMap<(LoreKind, String), LoreEntry>>,
    index: Option<Arc<dyn SimilarityIndex>>,
    embeddings: Option<Arc<dyn EmbeddingClient>>,
    degraded_logged: AtomicBool,
}

impl LoreStore {
    pub fn new(
        project_id: &str,
        index: Option<Arc<dyn SimilarityIndex>>,
        embeddings: Option<Arc<dyn EmbeddingClient>>,
    ) -> Self {
        Self {
            namespace: sanitize_namespace(project_id),
            mirror: Mutex::new(HashMap::new()),
            index,
            embeddings,
            degraded_logged: AtomicBool::new(false),
        }
    }

    /// A store with no similarity backend: every query uses the fallback.
    pub fn in_memory(project_id: &str) -> Self {
        Self::new(project_id, None, None)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Store entries, idempotently per `(kind, name)`: re-storing the same
    /// identity overwrites, never duplicates. Index upserts are best-effort;
    /// the mirror is authoritative.
    pub async fn store(&self, entries: &[LoreEntry]) -> Result<()> {
        {
            let mut mirror = self.mirror.lock().expect("lore mirror lock");
            for entry in entries {
                mirror.insert((entry.kind(), entry.name().to_lowercase()), entry.clone());
            }
        }

        let (Some(index), Some(embeddings)) = (&self.index, &self.embeddings) else {
            return Ok(());
        };

        let mut points = Vec::with_capacity(entries.len());
        for entry in entries {
            match embeddings.embed(&entry.render()).await {
                Ok(vector) => points.push(IndexPoint {
                    id: self.point_id(entry.kind(), entry.name()),
                    vector,
                    payload: IndexPayload {
                        kind: entry.kind(),
                        name: entry.name().to_string(),
                    },
                }),
                Err(e) => {
                    self.note_degraded(&format!("embedding failed for {}: {e}", entry.name()));
                    return Ok(());
                }
            }
        }
        if points.is_empty() {
            return Ok(());
        }
        let count = points.len();
        if let Err(e) = index.upsert(&self.namespace, points).await {
            self.note_degraded(&format!("index upsert failed: {e}"));
        } else {
            debug!(namespace = %self.namespace, count, "stored lore embeddings");
        }
        Ok(())
    }

    /// Similarity query, ranked when the index is reachable. On any failure
    /// (or with no index configured) returns an unranked kind-filtered slice
    /// of the mirror.
    pub async fn query(
        &self,
        text: &str,
        top_k: usize,
        kind_filter: Option<LoreKind>,
    ) -> Vec<ScoredLore> {
        if let (Some(index), Some(embeddings)) = (&self.index, &self.embeddings) {
            match self
                .ranked_query(index, embeddings, text, top_k, kind_filter)
                .await
            {
                Ok(results) => return results,
                Err(e) => self.note_degraded(&format!("similarity query failed: {e}")),
            }
        }
        self.fallback(top_k, kind_filter)
    }

    async fn ranked_query(
        &self,
        index: &Arc<dyn SimilarityIndex>,
        embeddings: &Arc<dyn EmbeddingClient>,
        text: &str,
        top_k: usize,
        kind_filter: Option<LoreKind>,
    ) -> Result<Vec<ScoredLore>> {
        let vector = embeddings.embed(text).await?;
        let matches = index
            .search(&self.namespace, vector, top_k, kind_filter)
            .await?;
        let mirror = self.mirror.lock().expect("lore mirror lock");
        Ok(matches
            .into_iter()
            .filter_map(|m| {
                mirror
                    .get(&(m.payload.kind, m.payload.name.to_lowercase()))
                    .map(|entry| ScoredLore {
                        entry: entry.clone(),
                        score: m.score,
                    })
            })
            .collect())
    }

    fn fallback(&self, top_k: usize, kind_filter: Option<LoreKind>) -> Vec<ScoredLore> {
        let mirror = self.mirror.lock().expect("lore mirror lock");
        let mut entries: Vec<&LoreEntry> = mirror
            .values()
            .filter(|e| kind_filter.is_none_or(|k| e.kind() == k))
            .collect();
        entries.sort_by(|a, b| (a.kind().as_str(), a.name()).cmp(&(b.kind().as_str(), b.name())));
        entries
            .into_iter()
            .take(top_k)
            .map(|entry| ScoredLore {
                entry: entry.clone(),
                score: 0.0,
            })
            .collect()
    }

    pub fn contains(&self, kind: LoreKind, name: &str) -> bool {
        self.mirror
            .lock()
            .expect("lore mirror lock")
            .contains_key(&(kind, name.to_lowercase()))
    }

    pub fn len(&self) -> usize {
        self.mirror.lock().expect("lore mirror lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stable point id: entries re-stored under the same identity overwrite
    /// their previous vector.
    fn point_id(&self, kind: LoreKind, name: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.namespace.as_bytes());
        hasher.update(b"/");
        hasher.update(kind.as_str().as_bytes());
        hasher.update(b"/");
        hasher.update(name.to_lowercase().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn note_degraded(&self, reason: &str) {
        if !self.degraded_logged.swap(true, Ordering::Relaxed) {
            warn!(namespace = %self.namespace, reason, "lore store degraded to unranked fallback");
        } else {
            debug!(namespace = %self.namespace, reason, "lore store degraded query");
        }
    }
}

/// Namespaces must be lowercase alphanumeric plus `-`/`_`.
pub fn sanitize_namespace(project_id: &str) -> String {
    project_id
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// HTTP client for the similarity-search service.
///
/// Endpoints: `POST {base}/points/upsert` and `POST {base}/points/search`,
/// both JSON, both namespaced per project.
pub struct HttpSimilarityIndex {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSimilarityIndex {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build similarity index client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    namespace: &'a str,
    points: Vec<IndexPoint>,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    namespace: &'a str,
    vector: Vec<f32>,
    top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<LoreKind>,
}

#[derive(Deserialize)]
struct SearchResponse {
    matches: Vec<IndexMatch>,
}

#[async_trait]
impl SimilarityIndex for HttpSimilarityIndex {
    async fn upsert(&self, namespace: &str, points: Vec<IndexPoint>) -> Result<()> {
        let url = format!("{}/points/upsert", self.base_url);
        self.http
            .post(&url)
            .json(&UpsertRequest { namespace, points })
            .send()
            .await
            .context("similarity index upsert request failed")?
            .error_for_status()
            .context("similarity index rejected upsert")?;
        Ok(())
    }

    async fn search(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
        kind_filter: Option<LoreKind>,
    ) -> Result<Vec<IndexMatch>> {
        let url = format!("{}/points/search", self.base_url);
        let response: SearchResponse = self
            .http
            .post(&url)
            .json(&SearchRequest {
                namespace,
                vector,
                top_k,
                kind: kind_filter,
            })
            .send()
            .await
            .context("similarity index search request failed")?
            .error_for_status()
            .context("similarity index rejected search")?
            .json()
            .await
            .context("similarity index returned malformed search response")?;
        Ok(response.matches)
    }
}
