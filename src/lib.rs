//! # k-snapshot
//!
//! Backup and restore of the workloads of one Kubernetes namespace.
//!
//! ## Features
//!
//! - **Parallel Backups**: one job per resource kind on a bounded worker pool
//! - **Plain Artifacts**: every object stored as YAML under `backups/{id}/{kind}/{name}.yaml`
//! - **Ordered Restore**: kinds replayed in dependency order, idempotent on re-run
//! - **Best-Effort Reporting**: per-object failures returned in a structured report
//! - **Hardening**: optional backup deadline with cancellation, retry with backoff on transient errors
//!
//! ## Quick Start
//!
//! ```no_run
//! use k_snapshot::snapshot::api::BackupRequest;
//! use k_snapshot::snapshot::engine::Engine;
//! use k_snapshot::snapshot::engine_config::EngineConfig;
//! use std::sync::Arc;
//!
//! let config = EngineConfig::from_path("config.yml")?;
//! let engine = Engine::new(&config, Arc::new(config.kubectl().clone()))?;
//!
//! let response = engine.create_backup(&BackupRequest { app_id: "shop-prod".into() })?;
//! println!("{}", response.backup_id);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod snapshot;
