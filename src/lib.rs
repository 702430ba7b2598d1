//! Framevault - Metadata resolution and resilience engine
//!
//! This library crate exposes the resolution engine for integration testing.

pub mod config;
pub mod metadata;
