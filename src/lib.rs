//! Depot distributes and serves large binary ML model artifacts across a
//! cluster of worker nodes.
//!
//! A model package travels through five stages:
//!
//! ```text
//! upload bytes
//!       │
//!       ▼
//! ┌─────────────────────────────────────────┐
//! │  Integrity + chunking (artifact::*)     │
//! │  • SHA-256 digest verified or computed  │
//! │  • split into fixed-size chunks         │
//! │  • chunk documents persisted            │
//! └─────────────────────────────────────────┘
//!       │ ... later, on a serving node
//!       ▼
//! ┌─────────────────────────────────────────┐
//! │  Reassembly + unpack (manager, archive) │
//! │  • chunks fetched, ordered, verified    │
//! │  • zip unpacked, model file normalized  │
//! └─────────────────────────────────────────┘
//!       │
//!       ▼
//! ┌─────────────────────────────────────────┐
//! │  Device placement (engine::*)           │
//! │  • one predictor per local device       │
//! │  • all-or-nothing, full rollback        │
//! │  • round-robin dispatch, atomic cursor  │
//! └─────────────────────────────────────────┘
//!       │
//!       ▼
//! unload / cleanup (lifecycle) — handles released in order, caches deleted
//! ```
//!
//! The numerical runtimes, the cluster transport, and the document store are
//! external collaborators behind traits; the crate ships in-process
//! implementations (stub engine, memory/file stores) that exercise the full
//! pipeline.

pub mod archive;
pub mod artifact;
pub mod config;
pub mod engine;
pub mod errors;
pub mod lifecycle;
pub mod manager;
pub mod observability;
pub mod stats;
pub mod store;

pub use artifact::{ArtifactMeta, ModelArtifact, ModelConfig, ModelFormat, ModelKind, ModelState};
pub use config::DepotConfig;
pub use engine::{Device, EngineKind, EngineRegistry, StubEngine};
pub use errors::{DepotError, PackagingError, Result};
pub use manager::{ModelManager, UndeployOutcome};
pub use observability::{init_production_logging, init_simple_logging};
pub use store::{ChunkStore, FsStore, MemoryStore, MetadataStore};
