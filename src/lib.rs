//! Collective-operations graph engine.
//!
//! Given a high-level collective request over a ranked, boxed communicator, this crate lowers it
//! into a directed acyclic graph of scaleup collectives, scaleout sends/receives, and local
//! reductions, partitions that graph into sequentially executable execution sets, and submits it
//! to a pluggable [`backend::Backend`] that emits the actual hardware commands.
//!
//! The crate never talks to hardware, a network fabric, or a device allocator itself — see
//! [`backend`] for the boundary.

pub mod backend;
pub mod collectives;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod graph;
pub mod operand;
pub mod primitive;
pub mod token;
pub mod types;

pub use backend::Backend;
pub use config::GraphConfig;
pub use dispatch::run;
pub use error::GraphError;
pub use graph::Graph;
pub use types::{CollectiveOp, CollectiveParams, CommunicatorView, DataType, ReduceOp};
