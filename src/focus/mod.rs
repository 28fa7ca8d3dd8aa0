//! The focus classification engine.

pub mod classifier;
pub mod embedding;
pub mod error;
pub mod expander;
pub mod launcher;
pub mod manager;
pub mod overrides;
pub mod protocol;
pub mod worker;

pub use classifier::{
    ClassificationResult, PagePayload, SimilarityClassifier, BLACKLIST_LABEL, DEFAULT_THRESHOLD,
    NO_MATCH_LABEL, WHITELIST_LABEL,
};
pub use embedding::{encode_anchors, normalize_text, AnchorEmbedding, EmbeddingBackend};
pub use error::EngineError;
pub use expander::{AnchorSet, GoalExpander, LanguageBackend};
pub use launcher::{ChildProcessLauncher, InProcessLauncher, WorkerHandle, WorkerLauncher};
pub use manager::{
    FocusManager, ManagerTimeouts, MonitorReply, MonitorStatus, StartOutcome, StopOutcome,
    WorkerPhase,
};
pub use overrides::{classify_override, normalize_url, ListEntry, OverrideDecision, OverrideLists};
pub use protocol::{WorkerReply, WorkerRequest};
pub use worker::{run_worker, serve_stdio, FocusWorker, WorkerBlueprint, WorkerComponents, WorkerConfig};
