//! Canonical message model: addresses, headers, attachments.

pub mod address;
pub mod message;
