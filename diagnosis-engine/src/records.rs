use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::consensus::{self, ConsensusVerdict};
use crate::error::RecordStoreError;
use crate::gateway::{DiagnosisResult, Method};
use crate::labels::DiagnosisType;
use crate::orchestrator::{DiagnosisEvent, DiagnosisPair};

/// A persisted diagnosis as the record store returns it. Persistence happens
/// on the remote side whenever a classifier call succeeds; this core only
/// reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisRecord {
    pub id: i64,
    pub image_url: String,
    pub diagnosis_type: DiagnosisType,
    pub method: Method,
    pub confidence: f64,
    pub created_date: DateTime<Utc>,
}

impl DiagnosisRecord {
    fn to_result(&self) -> DiagnosisResult {
        DiagnosisResult {
            diagnosis_type: self.diagnosis_type.clone(),
            confidence: self.confidence,
            image_url: self.image_url.clone(),
            method: self.method,
        }
    }
}

/// Source of historical diagnosis records. The seam exists so the cached
/// view can be exercised without a network.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<DiagnosisRecord>, RecordStoreError>;
}

/// HTTP client for the external record store's list endpoint. The store
/// returns records ordered newest-first.
pub struct RecordStoreClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RecordStoreClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl RecordSource for RecordStoreClient {
    async fn fetch(&self) -> Result<Vec<DiagnosisRecord>, RecordStoreError> {
        let response = self.client.get(&self.endpoint).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RecordStoreError::Status(status));
        }
        response
            .json()
            .await
            .map_err(|e| RecordStoreError::MalformedBody(e.to_string()))
    }
}

/// Cached view over a record source. Reads serve a shared snapshot;
/// diagnosis completion events invalidate it so subsequent reads observe
/// the entries persisted during the session.
pub struct CachedRecordStore<S> {
    source: S,
    cache: RwLock<Option<Arc<Vec<DiagnosisRecord>>>>,
}

impl<S: RecordSource> CachedRecordStore<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
        }
    }

    pub async fn list(&self) -> Result<Arc<Vec<DiagnosisRecord>>, RecordStoreError> {
        if let Some(records) = self.cache.read().await.clone() {
            return Ok(records);
        }

        let fetched = Arc::new(self.source.fetch().await?);
        *self.cache.write().await = Some(fetched.clone());
        Ok(fetched)
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}

/// Spawn a listener that drops the cached snapshot on every diagnosis
/// event. The listener ends when the orchestrator side of the channel is
/// dropped.
pub fn spawn_invalidation_listener<S>(
    store: Arc<CachedRecordStore<S>>,
    mut events: broadcast::Receiver<DiagnosisEvent>,
) -> JoinHandle<()>
where
    S: RecordSource + 'static,
{
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(DiagnosisEvent::Completed { image_url }) => {
                    debug!("invalidating record cache after diagnosis of {}", image_url);
                    store.invalidate().await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("record cache listener lagged by {} events", skipped);
                    store.invalidate().await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Records for one scanned image, paired by method.
#[derive(Debug, Clone, Serialize)]
pub struct RecordGroup {
    pub image_url: String,
    pub latest: DateTime<Utc>,
    pub records: Vec<DiagnosisRecord>,
}

impl RecordGroup {
    /// Reconstruct the diagnosis pair for this image. Records arrive
    /// newest-first, so the first record per method is the most recent
    /// opinion.
    pub fn pair(&self) -> DiagnosisPair {
        let mut pair = DiagnosisPair::default();
        for record in &self.records {
            if pair.get(record.method).is_none() {
                pair.insert(record.to_result());
            }
        }
        pair
    }

    /// Historical consensus for this image, when both opinions were
    /// persisted.
    pub fn consensus(&self) -> Option<ConsensusVerdict> {
        consensus::consensus(&self.pair())
    }
}

/// Group records by image, newest group first.
pub fn group_by_image(records: &[DiagnosisRecord]) -> Vec<RecordGroup> {
    let mut groups: Vec<RecordGroup> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for record in records {
        match index.get(record.image_url.as_str()) {
            Some(&at) => {
                let group = &mut groups[at];
                group.latest = group.latest.max(record.created_date);
                group.records.push(record.clone());
            }
            None => {
                index.insert(record.image_url.as_str(), groups.len());
                groups.push(RecordGroup {
                    image_url: record.image_url.clone(),
                    latest: record.created_date,
                    records: vec![record.clone()],
                });
            }
        }
    }

    groups.sort_by(|a, b| b.latest.cmp(&a.latest));
    groups
}

/// Per-type counts across scanned images. Each image contributes exactly
/// one count, preferring the medgemma opinion when both are present.
/// Unclassified opinions are left out of the tally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosisCounts {
    pub adenocarcinoma: usize,
    pub large_cell_carcinoma: usize,
    pub squamous_cell_carcinoma: usize,
    pub normal: usize,
}

pub fn count_by_type(groups: &[RecordGroup]) -> DiagnosisCounts {
    let mut counts = DiagnosisCounts::default();

    for group in groups {
        let preferred = group
            .records
            .iter()
            .find(|record| record.method == Method::Medgemma)
            .or_else(|| group.records.first());
        let Some(record) = preferred else { continue };

        match &record.diagnosis_type {
            DiagnosisType::Adenocarcinoma => counts.adenocarcinoma += 1,
            DiagnosisType::LargeCellCarcinoma => counts.large_cell_carcinoma += 1,
            DiagnosisType::SquamousCellCarcinoma => counts.squamous_cell_carcinoma += 1,
            DiagnosisType::Normal => counts.normal += 1,
            DiagnosisType::Unclassified(_) => {}
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::ConsensusStatus;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSource {
        calls: AtomicUsize,
        records: Vec<DiagnosisRecord>,
    }

    #[async_trait]
    impl RecordSource for CountingSource {
        async fn fetch(&self) -> Result<Vec<DiagnosisRecord>, RecordStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.clone())
        }
    }

    fn record(
        id: i64,
        image_url: &str,
        diagnosis: DiagnosisType,
        method: Method,
        minute: u32,
    ) -> DiagnosisRecord {
        DiagnosisRecord {
            id,
            image_url: image_url.to_string(),
            diagnosis_type: diagnosis,
            method,
            confidence: 88.0,
            created_date: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
        }
    }

    fn store_with(records: Vec<DiagnosisRecord>) -> Arc<CachedRecordStore<CountingSource>> {
        Arc::new(CachedRecordStore::new(CountingSource {
            calls: AtomicUsize::new(0),
            records,
        }))
    }

    #[tokio::test]
    async fn repeated_reads_fetch_once() {
        let store = store_with(vec![record(
            1,
            "a.png",
            DiagnosisType::Normal,
            Method::DeepLearning,
            0,
        )]);

        assert_eq!(store.list().await.unwrap().len(), 1);
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert_eq!(store.source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidation_forces_a_refetch() {
        let store = store_with(Vec::new());

        store.list().await.unwrap();
        store.invalidate().await;
        store.list().await.unwrap();

        assert_eq!(store.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn diagnosis_events_invalidate_the_cache() {
        let store = store_with(Vec::new());
        let (events, _) = broadcast::channel(4);
        let listener = spawn_invalidation_listener(store.clone(), events.subscribe());

        store.list().await.unwrap();
        events
            .send(DiagnosisEvent::Completed {
                image_url: "a.png".to_string(),
            })
            .unwrap();

        // Give the listener a chance to run.
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.list().await.unwrap();
        assert_eq!(store.source.calls.load(Ordering::SeqCst), 2);

        drop(events);
        let _ = listener.await;
    }

    #[test]
    fn grouping_pairs_records_by_image_newest_first() {
        let records = vec![
            record(4, "b.png", DiagnosisType::Normal, Method::Medgemma, 30),
            record(3, "b.png", DiagnosisType::Normal, Method::DeepLearning, 29),
            record(2, "a.png", DiagnosisType::Adenocarcinoma, Method::Medgemma, 10),
            record(1, "a.png", DiagnosisType::Adenocarcinoma, Method::DeepLearning, 9),
        ];

        let groups = group_by_image(&records);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].image_url, "b.png");
        assert_eq!(groups[1].image_url, "a.png");

        let pair = groups[1].pair();
        assert!(pair.is_complete());
        assert_eq!(
            groups[1].consensus().unwrap().status,
            ConsensusStatus::Confirmed
        );
        assert!(groups[0].consensus().unwrap().status == ConsensusStatus::Normal);
    }

    #[test]
    fn single_method_groups_have_no_historical_consensus() {
        let records = vec![record(
            1,
            "a.png",
            DiagnosisType::Normal,
            Method::DeepLearning,
            0,
        )];
        let groups = group_by_image(&records);
        assert!(groups[0].consensus().is_none());
    }

    #[test]
    fn counts_prefer_the_medgemma_opinion_per_image() {
        let records = vec![
            record(4, "b.png", DiagnosisType::Normal, Method::Medgemma, 30),
            record(3, "b.png", DiagnosisType::Adenocarcinoma, Method::DeepLearning, 29),
            record(1, "a.png", DiagnosisType::SquamousCellCarcinoma, Method::DeepLearning, 9),
        ];

        let counts = count_by_type(&group_by_image(&records));
        assert_eq!(
            counts,
            DiagnosisCounts {
                adenocarcinoma: 0,
                large_cell_carcinoma: 0,
                squamous_cell_carcinoma: 1,
                normal: 1,
            }
        );
    }
}
