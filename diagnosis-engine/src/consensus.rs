use serde::Serialize;

use crate::orchestrator::DiagnosisPair;

/// Clinical-priority classification of two independent model opinions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusStatus {
    Normal,
    Confirmed,
    CancerDifferent,
    Critical,
}

/// Derived verdict over a complete diagnosis pair. Recomputed on every read;
/// never stored. `severity_color` is a presentation hint only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusVerdict {
    pub status: ConsensusStatus,
    pub message: &'static str,
    pub severity_color: &'static str,
}

/// Derive the consensus verdict for a pair of opinions.
///
/// A verdict requires two independent opinions, so a partial pair yields
/// `None`. The normal/cancer split ranks as `Critical` above the
/// multi-class disagreement `CancerDifferent`: a missed cancer call is more
/// dangerous than a type mismatch between two cancer calls.
pub fn consensus(pair: &DiagnosisPair) -> Option<ConsensusVerdict> {
    let deep_learning = pair.deep_learning.as_ref()?;
    let medgemma = pair.medgemma.as_ref()?;

    let dl_type = &deep_learning.diagnosis_type;
    let medgemma_type = &medgemma.diagnosis_type;

    let verdict = match (dl_type.is_normal(), medgemma_type.is_normal()) {
        (true, true) => ConsensusVerdict {
            status: ConsensusStatus::Normal,
            message: "Both models confirm: No cancer detected",
            severity_color: "green",
        },
        (false, false) if dl_type == medgemma_type => ConsensusVerdict {
            status: ConsensusStatus::Confirmed,
            message: "Both models confirm: Cancer detected",
            severity_color: "red",
        },
        (false, false) => ConsensusVerdict {
            status: ConsensusStatus::CancerDifferent,
            message: "Cancer detected - Consult with doctor for confirmation",
            severity_color: "orange",
        },
        _ => ConsensusVerdict {
            status: ConsensusStatus::Critical,
            message: "Critical case - Consult with a radiologist immediately",
            severity_color: "red",
        },
    };

    Some(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{DiagnosisResult, Method};
    use crate::labels::DiagnosisType;

    fn opinion(method: Method, diagnosis: DiagnosisType) -> DiagnosisResult {
        DiagnosisResult {
            diagnosis_type: diagnosis,
            confidence: 90.0,
            image_url: "scan.png".to_string(),
            method,
        }
    }

    fn pair(dl: DiagnosisType, medgemma: DiagnosisType) -> DiagnosisPair {
        DiagnosisPair {
            deep_learning: Some(opinion(Method::DeepLearning, dl)),
            medgemma: Some(opinion(Method::Medgemma, medgemma)),
        }
    }

    #[test]
    fn partial_pairs_yield_no_verdict() {
        assert!(consensus(&DiagnosisPair::default()).is_none());

        let only_dl = DiagnosisPair {
            deep_learning: Some(opinion(Method::DeepLearning, DiagnosisType::Normal)),
            medgemma: None,
        };
        assert!(consensus(&only_dl).is_none());

        let only_medgemma = DiagnosisPair {
            deep_learning: None,
            medgemma: Some(opinion(Method::Medgemma, DiagnosisType::Normal)),
        };
        assert!(consensus(&only_medgemma).is_none());
    }

    #[test]
    fn both_normal_is_a_normal_verdict() {
        let verdict = consensus(&pair(DiagnosisType::Normal, DiagnosisType::Normal)).unwrap();
        assert_eq!(verdict.status, ConsensusStatus::Normal);
        assert_eq!(verdict.message, "Both models confirm: No cancer detected");
    }

    #[test]
    fn agreeing_cancer_types_are_confirmed() {
        let verdict = consensus(&pair(
            DiagnosisType::Adenocarcinoma,
            DiagnosisType::Adenocarcinoma,
        ))
        .unwrap();
        assert_eq!(verdict.status, ConsensusStatus::Confirmed);
        assert_eq!(verdict.message, "Both models confirm: Cancer detected");
    }

    #[test]
    fn disagreeing_cancer_types_defer_to_a_doctor() {
        let verdict = consensus(&pair(
            DiagnosisType::Adenocarcinoma,
            DiagnosisType::SquamousCellCarcinoma,
        ))
        .unwrap();
        assert_eq!(verdict.status, ConsensusStatus::CancerDifferent);
    }

    #[test]
    fn normal_cancer_split_is_critical_and_symmetric() {
        let verdict = consensus(&pair(DiagnosisType::Normal, DiagnosisType::Adenocarcinoma))
            .unwrap();
        assert_eq!(verdict.status, ConsensusStatus::Critical);

        let mirrored = consensus(&pair(DiagnosisType::Adenocarcinoma, DiagnosisType::Normal))
            .unwrap();
        assert_eq!(mirrored.status, ConsensusStatus::Critical);
        assert_eq!(mirrored.message, verdict.message);
    }

    #[test]
    fn unclassified_labels_count_as_cancer_opinions() {
        let slug = DiagnosisType::Unclassified("benign_nodule".to_string());

        let verdict = consensus(&pair(DiagnosisType::Normal, slug.clone())).unwrap();
        assert_eq!(verdict.status, ConsensusStatus::Critical);

        let verdict = consensus(&pair(slug.clone(), slug)).unwrap();
        assert_eq!(verdict.status, ConsensusStatus::Confirmed);
    }
}
