//! # Architecture Abstraction Layer
//!
//! Processor-level setup for the scheduler's host chip. Currently implements
//! the Cortex-M3 port used by the LPC1768; other cores go in sibling modules.

pub mod cortex_m3;
