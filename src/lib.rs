//! `calicoctl diags`: gather host networking diagnostics, bundle them into a
//! ZIP and share the bundle through an anonymous file-hosting service.

pub mod archive;
pub mod cli;
pub mod collector;
pub mod commands;
pub mod config;
pub mod diags;
pub mod progress;
pub mod redact;
pub mod report;
pub mod schema;
pub mod uploader;
