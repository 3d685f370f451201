// ABOUTME: Library root for edgeswap, staged blue/green rollouts of static frontends.
// ABOUTME: Exposes the config store, edge distributions, pipeline, purge path, and CLI support.

pub mod agent;
pub mod approval;
pub mod config;
pub mod diagnostics;
pub mod distribution;
pub mod error;
pub mod events;
pub mod objects;
pub mod output;
pub mod pipeline;
pub mod purge;
pub mod store;
pub mod types;
