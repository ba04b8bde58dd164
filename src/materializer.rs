// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Periodic Materializer (spec.md §4.6): re-applies policy defaults at a
//! fixed interval, creating any session context whose fingerprint is not
//! already present. Existing entries are left untouched.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::fingerprint::fingerprint;
use crate::gateway::UpsfGateway;
use crate::model::{NewSessionContext, SessionContextFilter};
use crate::policy::{self, ResolvedEntry};

pub struct PeriodicMaterializer {
    gateway: Arc<dyn UpsfGateway>,
    config_file: PathBuf,
    interval: Duration,
}

impl PeriodicMaterializer {
    pub fn new(gateway: Arc<dyn UpsfGateway>, config_file: PathBuf, interval: Duration) -> Self {
        Self {
            gateway,
            config_file,
            interval,
        }
    }

    /// Sleeps `interval`, then runs one materialization cycle, repeating
    /// until `stop` is cancelled. The Supervisor's own startup call to
    /// [`Self::materialize_once`] already covers the initial pass, so this
    /// loop waits before its first cycle rather than duplicating it
    /// (ground truth: `original_source/app.py:561-572`, whose recurring
    /// thread sleeps before each `create_default_items()` call). Exceptions
    /// during a cycle are swallowed; the next cycle retries (spec.md §4.6,
    /// §7).
    pub async fn run(&self, stop: CancellationToken) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = stop.cancelled() => return,
            }

            self.materialize_once().await;
        }
    }

    /// One materialization pass: the Supervisor calls this once,
    /// unconditionally, at startup even when periodic re-materialization
    /// is disabled (spec.md §4.6).
    pub async fn materialize_once(&self) {
        let entries = match policy::load_policy(&self.config_file) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!(event = "failed to load policy", error = %err);
                return;
            },
        };

        let existing = match self.gateway.list_session_contexts().await {
            Ok(contexts) => contexts,
            Err(err) => {
                tracing::error!(event = "failed to list session contexts", error = %err);
                return;
            },
        };
        let existing_names: std::collections::HashSet<String> =
            existing.into_iter().map(|c| c.name).collect();

        let shard_names: std::collections::HashSet<String> = match self.gateway.list_shards().await
        {
            Ok(shards) => shards.into_iter().map(|s| s.name).collect(),
            Err(err) => {
                tracing::error!(event = "failed to list shards", error = %err);
                return;
            },
        };

        for entry in entries {
            self.materialize_entry(entry, &existing_names, &shard_names).await;
        }
    }

    async fn materialize_entry(
        &self,
        entry: ResolvedEntry,
        existing_names: &std::collections::HashSet<String>,
        shard_names: &std::collections::HashSet<String>,
    ) {
        let name = fingerprint(
            &entry.circuit_id,
            &entry.remote_id,
            &entry.source_mac_address,
            entry.svlan,
            entry.cvlan,
        );

        if existing_names.contains(&name) {
            tracing::warn!(event = "session context exists already", sctx.hash = %name);
            return;
        }

        if let Some(shard) = &entry.shard {
            if !shard_names.contains(shard) {
                tracing::warn!(
                    event = "desired shard for session context not found, ignoring",
                    sctx.hash = %name,
                    shard.name = %shard,
                );
                return;
            }
        }

        let description = format!(
            "name={};customer_type={}",
            entry.name, entry.customer_type
        );

        let fields = NewSessionContext {
            filter: SessionContextFilter {
                source_mac: entry.source_mac_address.clone(),
                svlan: entry.svlan,
                cvlan: entry.cvlan,
            },
            circuit_id: entry.circuit_id.clone(),
            remote_id: entry.remote_id.clone(),
            required_service_groups: entry.required_service_groups.clone().unwrap_or_default(),
            required_quality: entry.required_quality.unwrap_or(0),
            desired_shard: entry.shard.clone(),
            description,
        };

        tracing::info!(event = "add entry", sctx.hash = %name);
        if let Err(err) = self.gateway.create_session_context(&name, fields).await {
            tracing::error!(event = "failed to create session context", sctx.hash = %name, error = %err);
        }
    }
}
