use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    services::ledger::{LedgerDelta, LedgerStore},
};
use dashmap::{mapref::entry::Entry, DashMap};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Largest per-item count accepted from a detector.
pub const MAX_DETECTION_COUNT: i64 = 1_000_000_000;

/// Item counts from the in-repo sample feed.
pub const SAMPLE_BATCH: &[(&str, i64)] = &[
    ("Burger Buns", 24),
    ("Cheddar Cheese", 10),
    ("Ground Beef", 15),
    ("Lettuce", 8),
    ("Tomatoes", 12),
];

/// A detector entry that was dropped during sanitization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SkippedDetection {
    pub name: String,
    pub reason: String,
}

/// Sanitized detector output: item name to strictly positive count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detections {
    items: BTreeMap<String, i64>,
    skipped: Vec<SkippedDetection>,
}

impl Detections {
    /// Keeps positive integral counts (integral floats included) and drops
    /// everything else with a reason.
    ///
    /// Names are trimmed, matching the form the ledger stores and sells by,
    /// and otherwise kept exactly: `" Eggs "` lands on `"Eggs"` while `"eggs"`
    /// stays separate. Names that collide after trimming are summed.
    pub fn sanitize(raw: &Map<String, Value>) -> Self {
        let mut detections = Detections::default();
        for (raw_name, value) in raw {
            let name = raw_name.trim();
            if name.is_empty() {
                detections.skip(raw_name, "empty item name");
                continue;
            }
            match parse_count(value) {
                Ok(count) => detections.add(name, count),
                Err(reason) => detections.skip(name, reason),
            }
        }
        detections
    }

    pub fn from_counts<'a, I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, i64)>,
    {
        let mut detections = Detections::default();
        for (name, count) in counts {
            let name = name.trim();
            if name.is_empty() {
                detections.skip(name, "empty item name");
            } else if count <= 0 {
                detections.skip(name, "non-positive count");
            } else if count > MAX_DETECTION_COUNT {
                detections.skip(name, "count out of range");
            } else {
                detections.add(name, count);
            }
        }
        detections
    }

    fn add(&mut self, name: &str, count: i64) {
        let slot = self.items.entry(name.to_string()).or_insert(0);
        *slot = slot.saturating_add(count).min(MAX_DETECTION_COUNT);
    }

    fn skip(&mut self, name: &str, reason: &str) {
        self.skipped.push(SkippedDetection {
            name: name.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.items.iter().map(|(name, count)| (name.as_str(), *count))
    }

    pub fn skipped(&self) -> &[SkippedDetection] {
        &self.skipped
    }

    /// Content hash of the sanitized batch, stable across key order in the input.
    pub fn batch_key(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, count) in &self.items {
            hasher.update(name.as_bytes());
            hasher.update(b"\t");
            hasher.update(count.to_string().as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

fn parse_count(value: &Value) -> Result<i64, &'static str> {
    let Value::Number(number) = value else {
        return Err("non-numeric count");
    };

    let count = if let Some(i) = number.as_i64() {
        i
    } else if number.as_u64().is_some() {
        return Err("count out of range");
    } else {
        let f = number.as_f64().ok_or("non-numeric count")?;
        if f.fract() != 0.0 {
            return Err("fractional count");
        }
        if f > MAX_DETECTION_COUNT as f64 {
            return Err("count out of range");
        }
        f as i64
    };

    if count <= 0 {
        Err("non-positive count")
    } else if count > MAX_DETECTION_COUNT {
        Err("count out of range")
    } else {
        Ok(count)
    }
}

/// Decides whether a batch may be applied. Detector output carries no
/// identity, so the default policy applies everything, including repeats.
pub trait DedupPolicy: Send + Sync {
    /// Claims `batch_key` for `business_id`; returns false for a batch already applied.
    fn admit(&self, business_id: Uuid, batch_key: &str) -> bool;

    /// Gives a claim back after a batch in which nothing was applied.
    fn release(&self, _business_id: Uuid, _batch_key: &str) {}
}

/// Applies every batch. Repeated submissions of the same detection count twice.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl DedupPolicy for AcceptAll {
    fn admit(&self, _business_id: Uuid, _batch_key: &str) -> bool {
        true
    }
}

/// Key count above which `admit` first drops expired keys.
const DEDUP_PURGE_THRESHOLD: usize = 4096;

/// Remembers batch keys per business for a fixed time window.
#[derive(Debug)]
pub struct InMemoryDedup {
    seen: DashMap<(Uuid, String), Instant>,
    ttl: Duration,
}

impl InMemoryDedup {
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            ttl,
        }
    }

    /// Drops keys older than the window.
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.seen.retain(|_, seen_at| seen_at.elapsed() < ttl);
    }
}

impl DedupPolicy for InMemoryDedup {
    fn admit(&self, business_id: Uuid, batch_key: &str) -> bool {
        if self.seen.len() >= DEDUP_PURGE_THRESHOLD {
            self.purge_expired();
        }
        let now = Instant::now();
        match self.seen.entry((business_id, batch_key.to_string())) {
            Entry::Occupied(mut seen) => {
                if now.duration_since(*seen.get()) >= self.ttl {
                    seen.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    fn release(&self, business_id: Uuid, batch_key: &str) {
        self.seen.remove(&(business_id, batch_key.to_string()));
    }
}

/// Outcome for one item of a batch. Exactly one of the ledger snapshot
/// (`total_added`, `current_quantity`) or `error` is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IngestionItemResult {
    pub name: String,
    pub count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_added: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_quantity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestionItemResult {
    pub fn is_applied(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngestionReport {
    pub batch_key: String,
    pub results: Vec<IngestionItemResult>,
    pub skipped: Vec<SkippedDetection>,
    pub applied: usize,
    pub failed: usize,
}

/// Folds detector batches into the ledger, one independent credit per item.
#[derive(Clone)]
pub struct IngestionService {
    ledger: LedgerStore,
    dedup: Arc<dyn DedupPolicy>,
    event_sender: Option<EventSender>,
}

impl IngestionService {
    pub fn new(
        ledger: LedgerStore,
        dedup: Arc<dyn DedupPolicy>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            ledger,
            dedup,
            event_sender,
        }
    }

    /// Credits every sanitized item. A failing item is reported in its own
    /// result and does not undo the others.
    #[instrument(skip(self, detections), fields(items = detections.len()))]
    pub async fn ingest(
        &self,
        business_id: Uuid,
        detections: Detections,
        batch_id: Option<String>,
    ) -> Result<IngestionReport, ServiceError> {
        let batch_key = batch_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| detections.batch_key());

        if detections.is_empty() {
            return Ok(IngestionReport {
                batch_key,
                results: Vec::new(),
                skipped: detections.skipped().to_vec(),
                applied: 0,
                failed: 0,
            });
        }

        if !self.dedup.admit(business_id, &batch_key) {
            return Err(ServiceError::Conflict(format!(
                "batch {} was already applied",
                batch_key
            )));
        }

        let mut results = Vec::with_capacity(detections.len());
        for (name, count) in detections.iter() {
            let result = match self.credit(business_id, name, count).await {
                Ok(entry) => IngestionItemResult {
                    name: entry.name,
                    count,
                    total_added: Some(entry.total_added),
                    current_quantity: Some(entry.current_quantity),
                    error: None,
                },
                Err(err) => {
                    warn!(%business_id, item = name, count, error = %err, "failed to credit item");
                    IngestionItemResult {
                        name: name.to_string(),
                        count,
                        total_added: None,
                        current_quantity: None,
                        error: Some(err.response_message()),
                    }
                }
            };
            results.push(result);
        }

        let applied = results.iter().filter(|r| r.is_applied()).count();
        let failed = results.len() - applied;

        if applied == 0 {
            self.dedup.release(business_id, &batch_key);
        }

        counter!("larder.ingest.items", applied as u64);
        if failed > 0 {
            counter!("larder.ingest.failed_items", failed as u64);
        }
        info!(%business_id, %batch_key, applied, failed, skipped = detections.skipped().len(), "ingestion batch processed");

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ItemsIngested {
                    business_id,
                    batch_key: batch_key.clone(),
                    applied,
                    failed,
                })
                .await;
        }

        Ok(IngestionReport {
            batch_key,
            results,
            skipped: detections.skipped().to_vec(),
            applied,
            failed,
        })
    }

    async fn credit(
        &self,
        business_id: Uuid,
        name: &str,
        count: i64,
    ) -> Result<crate::entities::ledger_entry::Model, ServiceError> {
        let delta = LedgerDelta::credit(count)?;
        self.ledger.get_or_create(business_id, name).await?;
        self.ledger.apply_delta(business_id, name, delta).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn sanitize_trims_padding_but_keeps_case() {
        let detections = Detections::sanitize(&raw(json!({
            "Eggs": 2,
            " Eggs ": 3,
            "eggs": 1
        })));

        let kept: Vec<_> = detections.iter().collect();
        assert_eq!(kept, vec![("Eggs", 5), ("eggs", 1)]);
        assert!(detections.skipped().is_empty());
    }

    #[test]
    fn sanitize_drops_invalid_counts() {
        let detections = Detections::sanitize(&raw(json!({
            "Tomatoes": 5,
            "Lettuce": 0,
            "Onions": -2,
            "raw_response": "I see five tomatoes",
            "Eggs": 12.0,
            "Milk": 1.5,
            "": 3,
            "Cheese": null
        })));

        let kept: Vec<_> = detections.iter().collect();
        assert_eq!(kept, vec![("Eggs", 12), ("Tomatoes", 5)]);
        assert_eq!(detections.skipped().len(), 6);
    }

    #[rstest]
    #[case(json!(3), Ok(3))]
    #[case(json!(3.0), Ok(3))]
    #[case(json!(0), Err("non-positive count"))]
    #[case(json!(-1.0), Err("non-positive count"))]
    #[case(json!(2.5), Err("fractional count"))]
    #[case(json!("4"), Err("non-numeric count"))]
    #[case(json!(u64::MAX), Err("count out of range"))]
    #[case(json!(MAX_DETECTION_COUNT + 1), Err("count out of range"))]
    fn parse_count_cases(#[case] value: Value, #[case] expected: Result<i64, &'static str>) {
        assert_eq!(parse_count(&value), expected);
    }

    #[test]
    fn names_colliding_after_trim_are_summed() {
        let detections = Detections::sanitize(&raw(json!({"Eggs": 2, " Eggs ": 3})));
        assert_eq!(detections.iter().collect::<Vec<_>>(), vec![("Eggs", 5)]);
    }

    #[test]
    fn in_memory_dedup_rejects_repeats_until_released() {
        let dedup = InMemoryDedup::new(Duration::from_secs(60));
        let business = Uuid::new_v4();

        assert!(dedup.admit(business, "batch-1"));
        assert!(!dedup.admit(business, "batch-1"));
        assert!(dedup.admit(Uuid::new_v4(), "batch-1"));

        dedup.release(business, "batch-1");
        assert!(dedup.admit(business, "batch-1"));
    }

    #[test]
    fn in_memory_dedup_forgets_after_ttl() {
        let dedup = InMemoryDedup::new(Duration::ZERO);
        let business = Uuid::new_v4();
        assert!(dedup.admit(business, "k"));
        assert!(dedup.admit(business, "k"));
        dedup.purge_expired();
        assert!(dedup.seen.is_empty());
    }

    proptest! {
        #[test]
        fn batch_key_ignores_input_order(counts in proptest::collection::btree_map("[a-z]{1,8}", 1i64..1000, 1..8)) {
            let forward: Map<String, Value> = counts.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let reversed: Map<String, Value> = counts.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();
            prop_assert_eq!(
                Detections::sanitize(&forward).batch_key(),
                Detections::sanitize(&reversed).batch_key()
            );
        }

        #[test]
        fn sanitized_counts_are_always_positive(values in proptest::collection::vec(-1000i64..1000, 0..16)) {
            let map: Map<String, Value> = values.iter().enumerate().map(|(i, v)| (format!("item{}", i), json!(v))).collect();
            let detections = Detections::sanitize(&map);
            prop_assert!(detections.iter().all(|(_, count)| count > 0));
            prop_assert_eq!(detections.len() + detections.skipped().len(), values.len());
        }
    }
}
