//! Message parsing: single RFC 5322 messages, concatenated stores, compound
//! binary items, header decoding.

pub mod eml;
pub mod header;
pub mod mbox;
pub mod msg;
