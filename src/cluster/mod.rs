//! Primary/Worker Process Topology
//!
//! Implements the multi-process core: the wire protocol between processes,
//! the dispatcher that serializes every store operation, and both ends of the
//! stdio IPC channel.
//!
//! ## Core Mechanisms
//! - **Protocol**: operations and replies travel as newline-delimited JSON
//!   frames, paired by correlation id, FIFO per channel.
//! - **Dispatcher**: a single task owns the store; operations from every
//!   worker funnel through it and each executes to completion before the
//!   next is taken.
//! - **Primary**: forks the worker pool, waits for every ready signal, then
//!   brings the balancer online. Losing a worker is fatal.
//! - **Worker**: holds no data; each HTTP request suspends until its matching
//!   reply returns from the primary.

pub mod dispatcher;
pub mod primary;
pub mod protocol;
pub mod worker;
