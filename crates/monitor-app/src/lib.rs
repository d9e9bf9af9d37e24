//! # monitor-app
//!
//! Reference wiring for the packet monitoring ingestion core: a
//! [`factory::PacketFactory`] implementation and an [`context::AppContext`]
//! that owns the block-pool registry and scheduler a set of
//! `monitor-net` sources are built against. Everything here is a
//! reference/demo layer over `monitor-wire`/`monitor-pool`/
//! `monitor-sched`/`monitor-net`; none of those crates depend back on
//! this one.

pub mod context;
pub mod factory;

pub use context::{AppContext, PacketRouter, DEFAULT_PACKET_TASK_PRIORITY};
pub use factory::{PooledPacketFactory, SimplePacketFactory};
