#![doc = include_str!("../README.md")]

pub mod admission;
pub mod cache;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod invoker;
pub mod orchestrator;
pub mod quota;
pub mod reports;
pub mod service;
pub mod store;

// --- 주요 타입 re-export ---

pub use admission::{AdmissionController, AdmissionPermit};
pub use cache::ScanCache;
pub use config::{OrphanPolicy, ScanEngineConfig, ScanEngineConfigBuilder};
pub use error::{ScanEngineError, ToolError};
pub use interpreter::{Interpretation, interpret};
pub use invoker::{
    ProcessOutput, ProcessRunner, RunLimits, ScanOutput, ScannerInvoker, TokioProcessRunner,
};
pub use orchestrator::ScanOrchestrator;
pub use quota::MonthlyQuota;
pub use reports::{HistoryPage, PageRequest, Pagination, ScanSummary};
pub use service::ScanService;
pub use store::{FileRecordStore, MemoryRecordStore, ScanFilter, ScanRecordStore};
