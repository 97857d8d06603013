//! Agent execution runtime
//!
//! This module runs per-agent work in parallel and waits for all of it:
//!
//! - **Agent**: The trait an evolving agent implements
//! - **Population**: Fixed-size, index-ordered agent collection
//! - **Worker Pool**: Persistent work-stealing threads with a batch barrier
//! - **Dispatcher**: Fans one event out to every agent and collects states
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   Population (n agents)                 │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐              │
//! │  │ Agent 0  │  │ Agent 1  │  │ Agent 2  │  ...         │
//! │  └──────────┘  └──────────┘  └──────────┘              │
//! │         │            │            │    take()           │
//! │         └────────────┴────────────┘                     │
//! │                      ▼                                  │
//! │          Work-Stealing Worker Pool (k threads)          │
//! │                      │                                  │
//! │         barrier: all n results, in index order          │
//! │                      ▼                                  │
//! │                  restore()                              │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Each agent is moved into exactly one task per batch, so no agent is ever
//! touched by two threads at once and no per-agent lock is needed.

pub mod agent;
pub mod dispatcher;
pub mod population;
pub mod worker_pool;

// Re-export commonly used types
pub use agent::{Agent, AgentState};
pub use dispatcher::{DispatchOutcome, EventDispatcher, TaskFailure, TaskPhase};
pub use population::Population;
pub use worker_pool::{PoolStats, WorkerPool};
