//! Data types for documents, chunks, vectors, points and search results.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Namespace for point ids derived from source document and chunk sequence.
const POINT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_9b7d_4c35_8e21_0d3f_5a6b_7c80);

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable source identifier.
    pub id: String,
    /// The raw text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    /// Create a document with no metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: HashMap::new(), source_uri: None }
    }
}

/// A window of a [`Document`]'s normalized text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// The id of the parent [`Document`].
    pub source_doc: String,
    /// Position of this chunk within its document, starting at zero.
    pub sequence: usize,
}

impl Chunk {
    /// The stable point id for this chunk, derived from its source and sequence.
    pub fn point_id(&self) -> PointId {
        PointId::derived(&self.source_doc, self.sequence)
    }
}

/// A fixed-dimension embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingVector {
    /// The vector components.
    pub values: Vec<f32>,
    /// Whether the vector has unit L2 norm.
    pub normalized: bool,
}

impl EmbeddingVector {
    /// Wrap raw values, recording whether they already have unit norm.
    pub fn from_values(values: Vec<f32>) -> Self {
        let normalized = (l2_norm(&values) - 1.0).abs() <= 1e-3;
        Self { values, normalized }
    }

    /// Scale `values` to unit L2 norm. Returns `None` for a zero vector.
    pub fn normalize(mut values: Vec<f32>) -> Option<Self> {
        let norm = l2_norm(&values);
        if norm == 0.0 || !norm.is_finite() {
            return None;
        }
        values.iter_mut().for_each(|v| *v /= norm);
        Some(Self { values, normalized: true })
    }

    /// Number of components.
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// L2 norm of the vector.
    pub fn norm(&self) -> f32 {
        l2_norm(&self.values)
    }
}

pub(crate) fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Identity of a point within a collection.
///
/// Vector databases accept unsigned integers or UUIDs; any other string is
/// mapped onto a UUID by [`PointId::normalized`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(u64),
    Uuid(String),
}

impl PointId {
    /// Deterministic id for chunk `sequence` of `source_doc`.
    pub fn derived(source_doc: &str, sequence: usize) -> Self {
        let name = format!("{source_doc}#{sequence}");
        Self::Uuid(Uuid::new_v5(&POINT_ID_NAMESPACE, name.as_bytes()).to_string())
    }

    /// Deterministic id derived from the text content itself.
    pub fn from_content(text: &str) -> Self {
        Self::Uuid(Uuid::new_v5(&POINT_ID_NAMESPACE, text.as_bytes()).to_string())
    }

    /// Return an id every backend accepts: numbers and valid UUIDs pass through,
    /// other strings are hashed onto a UUID.
    pub fn normalized(self) -> Self {
        match self {
            Self::Num(_) => self,
            Self::Uuid(s) => match Uuid::parse_str(&s) {
                Ok(uuid) => Self::Uuid(uuid.to_string()),
                Err(_) => Self::from_content(&s),
            },
        }
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Uuid(s) => f.write_str(s),
        }
    }
}

/// A vector stored in a collection together with its payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedPoint {
    pub id: PointId,
    pub vector: EmbeddingVector,
    /// Arbitrary payload; `text` holds the retrievable content.
    pub payload: Map<String, Value>,
}

impl IndexedPoint {
    /// Create a point whose payload holds only `text`.
    pub fn new(id: PointId, vector: EmbeddingVector, text: impl Into<String>) -> Self {
        let mut payload = Map::new();
        payload.insert("text".to_string(), Value::String(text.into()));
        Self { id, vector, payload }
    }

    /// The stored passage text, if the payload carries one.
    pub fn text(&self) -> Option<&str> {
        self.payload.get("text").and_then(Value::as_str)
    }
}

/// A retrieved [`IndexedPoint`] paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredPoint {
    pub point: IndexedPoint,
    /// Similarity score (higher is more similar).
    pub score: f32,
}

/// Hits ordered by descending similarity.
pub type QueryResult = Vec<ScoredPoint>;

/// Similarity metric of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

impl Metric {
    /// Score `a` against `b`; larger means more similar for every metric.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let (na, nb) = (l2_norm(a), l2_norm(b));
                if na == 0.0 || nb == 0.0 {
                    return 0.0;
                }
                dot(a, b) / (na * nb)
            }
            Self::Dot => dot(a, b),
            Self::Euclid => {
                -a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
            }
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cosine => "cosine",
            Self::Dot => "dot",
            Self::Euclid => "euclid",
        })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Name, dimension and metric of a collection. Fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub dim: usize,
    pub metric: Metric,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>, dim: usize, metric: Metric) -> Self {
        Self { name: name.into(), dim, metric }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_ids_are_stable_and_distinct() {
        assert_eq!(PointId::derived("doc0", 3), PointId::derived("doc0", 3));
        assert_ne!(PointId::derived("doc0", 3), PointId::derived("doc0", 4));
        assert_ne!(PointId::derived("doc0", 3), PointId::derived("doc1", 3));
    }

    #[test]
    fn test_normalized_point_ids() {
        assert_eq!(PointId::Num(7).normalized(), PointId::Num(7));

        let uuid = "A0EEBC99-9C0B-4EF8-BB6D-6BB9BD380A11".to_string();
        assert_eq!(
            PointId::Uuid(uuid).normalized(),
            PointId::Uuid("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11".into())
        );

        let hashed = PointId::Uuid("chunk-17".into()).normalized();
        assert_eq!(hashed, PointId::from_content("chunk-17"));
    }

    #[test]
    fn test_point_id_serde_untagged() {
        let num: PointId = serde_json::from_str("42").unwrap();
        assert_eq!(num, PointId::Num(42));
        let text: PointId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(text, PointId::Uuid("abc".into()));
    }

    #[test]
    fn test_normalize_rejects_zero_vector() {
        assert!(EmbeddingVector::normalize(vec![0.0, 0.0]).is_none());
        let v = EmbeddingVector::normalize(vec![3.0, 4.0]).unwrap();
        assert!(v.normalized);
        assert!((v.norm() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_metric_scores_order_by_similarity() {
        let q = [1.0, 0.0];
        let near = [0.9, 0.1];
        let far = [0.0, 1.0];
        for metric in [Metric::Cosine, Metric::Dot, Metric::Euclid] {
            assert!(metric.score(&q, &near) > metric.score(&q, &far), "{metric}");
        }
    }

    #[test]
    fn test_missing_text_payload() {
        let point = IndexedPoint {
            id: PointId::Num(1),
            vector: EmbeddingVector::from_values(vec![1.0]),
            payload: Map::new(),
        };
        assert_eq!(point.text(), None);
    }
}
