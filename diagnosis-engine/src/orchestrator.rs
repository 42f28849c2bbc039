use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::error::{DiagnosisError, GatewayError};
use crate::gateway::{Classifier, DiagnosisResult, Method};
use crate::settle;

/// Emitted after a diagnosis session succeeds so owners of cached views can
/// refresh. Delivery is fire-and-forget.
#[derive(Debug, Clone)]
pub enum DiagnosisEvent {
    Completed { image_url: String },
}

/// Zero, one or two opinions on a single image, keyed by method. At most one
/// result per method; a partial pair is the degraded-but-usable outcome of a
/// single classifier failure.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagnosisPair {
    pub deep_learning: Option<DiagnosisResult>,
    pub medgemma: Option<DiagnosisResult>,
}

impl DiagnosisPair {
    pub fn get(&self, method: Method) -> Option<&DiagnosisResult> {
        match method {
            Method::DeepLearning => self.deep_learning.as_ref(),
            Method::Medgemma => self.medgemma.as_ref(),
        }
    }

    pub fn insert(&mut self, result: DiagnosisResult) {
        match result.method {
            Method::DeepLearning => self.deep_learning = Some(result),
            Method::Medgemma => self.medgemma = Some(result),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.deep_learning.is_some() && self.medgemma.is_some()
    }

    pub fn populated_count(&self) -> usize {
        [&self.deep_learning, &self.medgemma]
            .into_iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    fn any_result(&self) -> Option<&DiagnosisResult> {
        self.deep_learning.as_ref().or(self.medgemma.as_ref())
    }
}

/// Outcome of one diagnosis session: the aggregated pair plus any per-method
/// failures that were tolerated along the way.
#[derive(Debug)]
pub struct DiagnosisOutcome {
    pub pair: DiagnosisPair,
    pub failures: Vec<GatewayError>,
}

/// Runs one diagnosis session: both classifiers concurrently, joint
/// settlement, partial-failure tolerance, and a completion event for cache
/// owners.
pub struct DiagnosisOrchestrator {
    deep_learning: Arc<dyn Classifier>,
    medgemma: Arc<dyn Classifier>,
    events: broadcast::Sender<DiagnosisEvent>,
}

impl DiagnosisOrchestrator {
    pub fn new(deep_learning: Arc<dyn Classifier>, medgemma: Arc<dyn Classifier>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            deep_learning,
            medgemma,
            events,
        }
    }

    /// Subscribe to diagnosis completion events.
    pub fn subscribe(&self) -> broadcast::Receiver<DiagnosisEvent> {
        self.events.subscribe()
    }

    /// Submit the image to both classifiers and aggregate their opinions.
    ///
    /// Both calls are dispatched back-to-back and awaited jointly, so their
    /// network latencies overlap. The pair is only acted upon after both
    /// outcomes have settled. One unavailable model degrades the outcome to
    /// a partial pair; the session fails only when both models fail.
    pub async fn diagnose(
        &self,
        image: &[u8],
        filename: &str,
    ) -> Result<DiagnosisOutcome, DiagnosisError> {
        info!(
            "running diagnosis for {} with {} and {}",
            filename,
            self.deep_learning.method(),
            self.medgemma.method()
        );

        let (dl_outcome, medgemma_outcome) = settle::settle_pair(
            self.deep_learning.classify(image, filename),
            self.medgemma.classify(image, filename),
        )
        .await;

        let (dl_outcome, medgemma_outcome) = match (dl_outcome, medgemma_outcome) {
            (Err(deep_learning), Err(medgemma)) => {
                error!(
                    "diagnosis of {} failed on both classifiers: {}; {}",
                    filename, deep_learning, medgemma
                );
                return Err(DiagnosisError::AllClassifiersFailed {
                    deep_learning,
                    medgemma,
                });
            }
            settled => settled,
        };

        let mut pair = DiagnosisPair::default();
        let mut failures = Vec::new();

        for outcome in [dl_outcome, medgemma_outcome] {
            match outcome {
                Ok(result) => {
                    info!(
                        "{} classifier diagnosed {} as {} ({:.2}%)",
                        result.method, filename, result.diagnosis_type, result.confidence
                    );
                    pair.insert(result);
                }
                Err(err) => {
                    warn!("continuing with a partial diagnosis: {}", err);
                    failures.push(err);
                }
            }
        }

        // Fire-and-forget: a missing or lagging subscriber never fails the
        // diagnosis.
        if let Some(result) = pair.any_result() {
            let _ = self.events.send(DiagnosisEvent::Completed {
                image_url: result.image_url.clone(),
            });
        }

        Ok(DiagnosisOutcome { pair, failures })
    }
}
