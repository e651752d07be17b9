//! # Operation strategies and the transfer orchestrator
//!
//! - `strategy` — the per-pair file-operation contract
//! - `local` — local ↔ local over the filesystem
//! - `direct` — local ↔ remote, streamed straight through
//! - `remote` — both ends on one protocol: native rename/copy, else staged
//! - `staged` — remote A → remote B via a local temp file
//! - `registry` — `(src, dst)` → strategy table
//! - `orchestrator` — public entry point with retry and path context

pub mod direct;
pub mod local;
pub mod orchestrator;
pub mod registry;
pub mod remote;
pub mod staged;
pub mod strategy;

pub use direct::DirectStrategy;
pub use local::LocalStrategy;
pub use orchestrator::{OrchestratorBuilder, TransferOrchestrator};
pub use registry::StrategyRegistry;
pub use remote::RemoteStrategy;
pub use staged::StagedStrategy;
pub use strategy::{validate_name, OperationStrategy};
