// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Deterministic identity for a session context (spec.md §4.1).
//!
//! The five subscriber-identifying components are rendered as strings
//! (numerics base-10, absent values as `""`), concatenated in fixed order
//! with no separator, and reduced by MD5. The hash choice is a
//! compatibility requirement across versions, not a security boundary.

use md5::{Digest, Md5};

/// Computes the session context name from its identifying 5-tuple.
///
/// Pure and total: equal inputs always yield equal output, independent of
/// any other session context field.
pub fn fingerprint(
    circuit_id: &str,
    remote_id: &str,
    source_mac: &str,
    svlan: u32,
    cvlan: u32,
) -> String {
    let mut hasher = Md5::new();
    hasher.update(circuit_id.as_bytes());
    hasher.update(remote_id.as_bytes());
    hasher.update(source_mac.as_bytes());
    hasher.update(svlan.to_string().as_bytes());
    hasher.update(cvlan.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
