// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Data model for the three UPSF record kinds SCM reads and partially
//! writes: [`Shard`], [`Sgup`], [`SessionContext`]. Mirrors spec.md §3.

use std::collections::HashSet;

/// A logical bucket of subscriber sessions placed on exactly one SGUP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    pub name: String,
    pub desired_sgup: String,
    pub max_session_count: u64,
    pub allocated_session_count: u64,
}

impl Shard {
    /// Load as a fraction of capacity in `[0, 1)`. `None` when capacity is
    /// zero (such a shard is never selectable, see Step E/F).
    pub fn load(&self) -> Option<f64> {
        if self.max_session_count == 0 {
            return None;
        }
        Some(self.allocated_session_count as f64 / self.max_session_count as f64)
    }

    pub fn has_capacity(&self) -> bool {
        self.max_session_count > 0 && self.allocated_session_count < self.max_session_count
    }
}

/// A Service Gateway User Plane: a data-plane element hosting one or more
/// shards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sgup {
    pub name: String,
    pub supported_service_groups: HashSet<String>,
    pub max_session_count: u64,
    pub allocated_session_count: u64,
}

impl Sgup {
    pub fn load(&self) -> Option<f64> {
        if self.max_session_count == 0 {
            return None;
        }
        Some(self.allocated_session_count as f64 / self.max_session_count as f64)
    }

    pub fn has_capacity(&self) -> bool {
        self.max_session_count > 0 && self.allocated_session_count < self.max_session_count
    }

    pub fn supports(&self, required: &[String]) -> bool {
        required
            .iter()
            .all(|rsg| self.supported_service_groups.contains(rsg))
    }
}

/// Subscriber-identifying filter tuple carried by a [`SessionContext`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionContextFilter {
    pub source_mac: String,
    pub svlan: u32,
    pub cvlan: u32,
}

/// Placement as last observed by the UPSF, not owned by SCM.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CurrentState {
    pub user_plane_shard: Option<String>,
    pub tsf_shard: Option<String>,
}

/// Lifecycle state of a session context as reported by the UPSF. SCM is a
/// consumer of this field only; it never drives transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DerivedState {
    #[default]
    Unknown,
    Inactive,
    Active,
    Updating,
    Deleting,
    Deleted,
}

/// One subscriber session and its desired/current placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// Equal to `fingerprint(circuit_id, remote_id, source_mac, svlan, cvlan)`.
    pub name: String,
    pub filter: SessionContextFilter,
    pub circuit_id: String,
    pub remote_id: String,
    pub required_service_groups: Vec<String>,
    pub required_quality: u32,
    pub desired_shard: Option<String>,
    pub current_state: CurrentState,
    pub derived_state: DerivedState,
    /// Human-readable audit trail set at creation time (policy entry name
    /// plus customer type); SCM never writes it after creation.
    pub description: String,
}

impl SessionContext {
    pub fn needs_quality_default(&self) -> bool {
        self.required_quality == 0
    }

    pub fn needs_service_group_default(&self) -> bool {
        self.required_service_groups.is_empty()
            || self.required_service_groups == [String::new()]
    }

    pub fn has_desired_shard(&self) -> bool {
        matches!(&self.desired_shard, Some(s) if !s.is_empty())
    }
}

/// Partial update for [`Shard`]: `None` means "do not modify".
#[derive(Debug, Clone, Default)]
pub struct ShardUpdate {
    pub allocated_session_count: Option<u64>,
}

/// Partial update for [`Sgup`]: `None` means "do not modify".
#[derive(Debug, Clone, Default)]
pub struct SgupUpdate {
    pub allocated_session_count: Option<u64>,
}

/// Partial update for [`SessionContext`]: `None` means "do not modify".
/// SCM never demotes: it only ever fills these in from empty.
#[derive(Debug, Clone, Default)]
pub struct SessionContextUpdate {
    pub required_quality: Option<u32>,
    pub required_service_groups: Option<Vec<String>>,
    pub desired_shard: Option<String>,
}

impl SessionContextUpdate {
    pub fn is_empty(&self) -> bool {
        self.required_quality.is_none()
            && self.required_service_groups.is_none()
            && self.desired_shard.is_none()
    }
}

/// Fields supplied when creating a new session context from policy.
#[derive(Debug, Clone, Default)]
pub struct NewSessionContext {
    pub filter: SessionContextFilter,
    pub circuit_id: String,
    pub remote_id: String,
    pub required_service_groups: Vec<String>,
    pub required_quality: u32,
    pub desired_shard: Option<String>,
    pub description: String,
}
