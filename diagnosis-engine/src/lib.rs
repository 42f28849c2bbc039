pub mod config;
pub mod consensus;
pub mod error;
pub mod gateway;
pub mod labels;
pub mod orchestrator;
pub mod records;
pub mod report;
pub mod settle;

// Re-export commonly used types
pub use config::EngineConfig;
pub use consensus::{ConsensusStatus, ConsensusVerdict, consensus};
pub use error::{DiagnosisError, GatewayError, RecordStoreError, ReportError};
pub use gateway::{Classifier, DiagnosisResult, HttpClassifierGateway, Method};
pub use labels::{DiagnosisType, normalize};
pub use orchestrator::{DiagnosisEvent, DiagnosisOrchestrator, DiagnosisOutcome, DiagnosisPair};
pub use records::{CachedRecordStore, DiagnosisRecord, RecordSource, RecordStoreClient};
pub use report::{Patient, ReportArtifact, ReportCoordinator, ReportRequest};
