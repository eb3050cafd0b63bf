//! Qdrant-backed vector storage.
//!
//! One collection, `{prefix}memories`, cosine distance. Qdrant reports a
//! similarity score; it is turned into a distance as `1 - score`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use keepsake_models::{timestamp, MemoryId};
use qdrant_client::qdrant::{
    condition::ConditionOneOf, point_id::PointIdOptions, r#match::MatchValue, Condition,
    CreateCollectionBuilder, DeletePointsBuilder, Distance, FieldCondition, Filter, Match,
    PointId, PointStruct, Range, RetrievedPoint, ScoredPoint, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    Error, PointPayload, Result, SearchFilter, StoredPoint, VectorMatch, VectorPoint, VectorStore,
};

/// Point payload key names
const KEY_MEMORY_ID: &str = "memory_id";
const KEY_EMOTION: &str = "emotion";
const KEY_CREATED_TS: &str = "created_ts";

const SCROLL_PAGE: u32 = 256;

/// Configuration for the Qdrant backend.
#[derive(Debug, Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub collection_prefix: String,
}

impl QdrantConfig {
    pub fn new(url: impl Into<String>, collection_prefix: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            collection_prefix: collection_prefix.into(),
        }
    }

    /// The single collection holding memory vectors.
    pub fn collection_name(&self) -> String {
        format!("{}memories", self.collection_prefix)
    }
}

/// [`VectorStore`] over a Qdrant collection.
#[derive(Clone)]
pub struct QdrantStore {
    inner: Arc<QdrantStoreInner>,
}

struct QdrantStoreInner {
    client: Qdrant,
    collection: String,
}

impl QdrantStore {
    /// Connect and verify the server answers.
    pub async fn connect(config: &QdrantConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.url)
            .build()
            .map_err(|e| Error::VectorStore(format!("Failed to connect to Qdrant: {}", e)))?;

        client
            .list_collections()
            .await
            .map_err(|e| Error::VectorStore(format!("Qdrant connection test failed: {}", e)))?;

        let collection = config.collection_name();
        info!(url = %config.url, collection = %collection, "Qdrant store connected");

        Ok(Self {
            inner: Arc::new(QdrantStoreInner { client, collection }),
        })
    }

    pub fn collection(&self) -> &str {
        &self.inner.collection
    }

    async fn existing_dimension(&self) -> Result<Option<usize>> {
        let collection = self.collection();

        let exists = self
            .inner
            .client
            .collection_exists(collection)
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to check collection: {}", e)))?;

        if !exists {
            return Ok(None);
        }

        let info = self
            .inner
            .client
            .collection_info(collection)
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to get collection info: {}", e)))?;

        let dim = info
            .result
            .as_ref()
            .and_then(|r| r.config.as_ref())
            .and_then(|c| c.params.as_ref())
            .and_then(|p| p.vectors_config.as_ref())
            .and_then(|vc| match vc.config.as_ref() {
                Some(qdrant_client::qdrant::vectors_config::Config::Params(params)) => {
                    Some(params.size as usize)
                }
                _ => None,
            })
            .unwrap_or(0);

        Ok(Some(dim))
    }

    async fn scroll_filtered(&self, filter: Option<Filter>) -> Result<Vec<StoredPoint>> {
        let mut points = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(self.collection())
                .limit(SCROLL_PAGE)
                .with_payload(true);

            if let Some(off) = offset.take() {
                builder = builder.offset(off);
            }
            if let Some(f) = filter.clone() {
                builder = builder.filter(f);
            }

            let response = self
                .inner
                .client
                .scroll(builder)
                .await
                .map_err(|e| Error::VectorStore(format!("Scroll failed: {}", e)))?;

            for point in response.result {
                if let Some(stored) = retrieved_point_to_stored(point) {
                    points.push(stored);
                }
            }

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(points)
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn backend(&self) -> &'static str {
        "qdrant"
    }

    async fn ensure_ready(&self, dimension: usize) -> Result<()> {
        let collection = self.collection();

        if let Some(existing_dim) = self.existing_dimension().await? {
            if existing_dim == dimension {
                debug!(collection, dimension, "Collection already exists with correct dimension");
                return Ok(());
            }

            info!(
                collection,
                existing_dim,
                new_dim = dimension,
                "Collection dimension mismatch - recreating"
            );

            self.inner
                .client
                .delete_collection(collection)
                .await
                .map_err(|e| {
                    Error::VectorStore(format!("Failed to delete mismatched collection: {}", e))
                })?;
        }

        self.inner
            .client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to create collection: {}", e)))?;

        info!(collection, dimension, "Created Qdrant collection");

        Ok(())
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let qdrant_points = points
            .into_iter()
            .map(|point| {
                let payload = payload_to_qdrant(&point.payload)?;
                Ok(PointStruct::new(point.id, point.vector, payload))
            })
            .collect::<Result<Vec<_>>>()?;

        let count = qdrant_points.len();

        self.inner
            .client
            .upsert_points(UpsertPointsBuilder::new(self.collection(), qdrant_points).wait(true))
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to upsert points: {}", e)))?;

        debug!(collection = %self.collection(), count, "Upserted points");

        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<VectorMatch>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut builder = SearchPointsBuilder::new(self.collection(), vector.to_vec(), limit as u64)
            .with_payload(true);

        if let Some(f) = to_qdrant_filter(filter) {
            builder = builder.filter(f);
        }

        let response = self
            .inner
            .client
            .search_points(builder)
            .await
            .map_err(|e| Error::VectorStore(format!("Search failed: {}", e)))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(scored_point_to_match)
            .collect())
    }

    async fn delete(&self, mut ids: Vec<String>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        // Qdrant does not report a deleted count.
        ids.sort();
        ids.dedup();
        let count = ids.len();
        let point_ids: Vec<PointId> = ids.into_iter().map(PointId::from).collect();

        self.inner
            .client
            .delete_points(
                DeletePointsBuilder::new(self.collection())
                    .points(point_ids)
                    .wait(true),
            )
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to delete points: {}", e)))?;

        Ok(count)
    }

    async fn delete_memory(&self, memory_id: MemoryId) -> Result<usize> {
        // Scroll + delete by id; the delete builder takes explicit ids here.
        let filter = Filter {
            must: vec![integer_condition(KEY_MEMORY_ID, memory_id)],
            ..Default::default()
        };
        let matching = self.scroll_filtered(Some(filter)).await?;
        let ids: Vec<String> = matching.into_iter().map(|p| p.id).collect();
        self.delete(ids).await
    }

    async fn scroll_all(&self) -> Result<Vec<StoredPoint>> {
        self.scroll_filtered(None).await
    }

    async fn count(&self) -> Result<u64> {
        let info = self
            .inner
            .client
            .collection_info(self.collection())
            .await
            .map_err(|e| Error::VectorStore(format!("Failed to get collection info: {}", e)))?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0))
    }
}

/// Translate a [`SearchFilter`]; `None` when it has no conditions.
fn to_qdrant_filter(filter: &SearchFilter) -> Option<Filter> {
    let mut conditions = Vec::new();

    if let Some(after) = &filter.created_after {
        conditions.push(Condition {
            condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
                key: KEY_CREATED_TS.to_string(),
                range: Some(Range {
                    gte: Some(timestamp::epoch_seconds(after) as f64),
                    ..Default::default()
                }),
                ..Default::default()
            })),
        });
    }

    if let Some(emotion) = &filter.emotion {
        conditions.push(keyword_condition(KEY_EMOTION, emotion));
    }

    if let Some(id) = filter.memory_id {
        conditions.push(integer_condition(KEY_MEMORY_ID, id));
    }

    if conditions.is_empty() {
        return None;
    }

    Some(Filter {
        must: conditions,
        ..Default::default()
    })
}

fn keyword_condition(key: &str, value: &str) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
            key: key.to_string(),
            r#match: Some(Match {
                match_value: Some(MatchValue::Keyword(value.to_string())),
            }),
            ..Default::default()
        })),
    }
}

fn integer_condition(key: &str, value: i64) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
            key: key.to_string(),
            r#match: Some(Match {
                match_value: Some(MatchValue::Integer(value)),
            }),
            ..Default::default()
        })),
    }
}

fn payload_to_qdrant(payload: &PointPayload) -> Result<HashMap<String, QdrantValue>> {
    let Value::Object(map) = serde_json::to_value(payload)? else {
        return Err(Error::VectorStore("payload is not an object".to_string()));
    };

    Ok(map
        .into_iter()
        .filter_map(|(k, v)| json_to_qdrant_value(v).map(|qv| (k, qv)))
        .collect())
}

fn payload_from_qdrant(raw: HashMap<String, QdrantValue>) -> Option<PointPayload> {
    let map: serde_json::Map<String, Value> = raw
        .into_iter()
        .filter_map(|(k, v)| qdrant_value_to_json(v).map(|jv| (k, jv)))
        .collect();

    serde_json::from_value(Value::Object(map)).ok()
}

fn json_to_qdrant_value(value: Value) -> Option<QdrantValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(QdrantValue::from(b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(QdrantValue::from(i))
            } else {
                n.as_f64().map(QdrantValue::from)
            }
        }
        Value::String(s) => Some(QdrantValue::from(s)),
        Value::Array(arr) => {
            let values: Vec<QdrantValue> =
                arr.into_iter().filter_map(json_to_qdrant_value).collect();
            if values.is_empty() {
                None
            } else {
                Some(QdrantValue::from(values))
            }
        }
        Value::Object(_) => Some(QdrantValue::from(value.to_string())),
    }
}

fn qdrant_value_to_json(value: QdrantValue) -> Option<Value> {
    use qdrant_client::qdrant::value::Kind;

    match value.kind {
        Some(Kind::NullValue(_)) => Some(Value::Null),
        Some(Kind::BoolValue(b)) => Some(Value::Bool(b)),
        Some(Kind::IntegerValue(i)) => Some(Value::Number(i.into())),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d).map(Value::Number),
        Some(Kind::StringValue(s)) => Some(Value::String(s)),
        Some(Kind::ListValue(list)) => Some(Value::Array(
            list.values
                .into_iter()
                .filter_map(qdrant_value_to_json)
                .collect(),
        )),
        Some(Kind::StructValue(obj)) => Some(Value::Object(
            obj.fields
                .into_iter()
                .filter_map(|(k, v)| qdrant_value_to_json(v).map(|jv| (k, jv)))
                .collect(),
        )),
        None => None,
    }
}

fn point_id_string(id: Option<PointId>) -> String {
    match id.and_then(|p| p.point_id_options) {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

fn scored_point_to_match(point: ScoredPoint) -> Option<VectorMatch> {
    let payload = payload_from_qdrant(point.payload)?;
    Some(VectorMatch {
        id: point_id_string(point.id),
        distance: 1.0 - point.score,
        payload,
    })
}

fn retrieved_point_to_stored(point: RetrievedPoint) -> Option<StoredPoint> {
    let payload = payload_from_qdrant(point.payload)?;
    Some(StoredPoint {
        id: point_id_string(point.id),
        payload,
    })
}
