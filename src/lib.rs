//! `mailpress` — convert mail artifacts into portable PDF documents.
//!
//! This crate provides the core library for classifying mail inputs
//! (`.eml`, `.mbox`, `.msg`, ZIP archives), normalizing them into a
//! canonical message form, and rendering each message as a paginated PDF
//! with its attachments extracted alongside.

pub mod archive;
pub mod compose;
pub mod config;
pub mod detect;
pub mod encoding;
pub mod error;
pub mod extract;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod render;
