//! Error types for synchronization runs.

use crate::store::StoreError;
use grove_core::FactError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Problems with the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No store path configured (set store_path or GROVE_STORE_PATH)")]
    MissingStorePath,
    #[error("Invalid {name}: {value} (must be at least 1)")]
    InvalidBatchSize { name: &'static str, value: usize },
    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The step of a run an operation belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Tombstones,
    Nodes,
    Restore,
    Edges,
    CloneNodes,
    CloneEdges,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Tombstones => "tombstones",
            Phase::Nodes => "nodes",
            Phase::Restore => "restore",
            Phase::Edges => "edges",
            Phase::CloneNodes => "clone-nodes",
            Phase::CloneEdges => "clone-edges",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid fact: {0}")]
    InvalidFact(#[from] FactError),

    #[error("Fact {class} belongs to {found}, expected {expected}")]
    MixedPartition {
        class: String,
        expected: String,
        found: String,
    },

    #[error("Cannot clone {project}@{branch} onto itself")]
    InvalidClone { project: String, branch: String },

    #[error("{phase} batch {batch_index} failed after {attempts} attempts: {source}")]
    Batch {
        phase: Phase,
        batch_index: usize,
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    /// Index of the batch that failed, when the failure came from one.
    pub fn batch_index(&self) -> Option<usize> {
        match self {
            SyncError::Batch { batch_index, .. } => Some(*batch_index),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
