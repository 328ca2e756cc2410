//! Capstan Engine
//!
//! The build execution engine: storage-backed build/team registries, input
//! resolution over prior successful runs, dispatch to the external executor,
//! the per-build event stream, and the hooked step composer for builds that
//! execute in-process.

pub mod api;
pub mod bus;
pub mod config;
pub mod db;
pub mod exec;
pub mod repository;
pub mod service;
pub mod stream;
