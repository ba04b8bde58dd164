// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Reconciler (spec.md §4.5): bootstraps a full mapping pass, then reacts
//! to Shard and Session Context mutations delivered over the UPSF watch
//! stream.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::gateway::{UpsfGateway, WatchEvent, WatchKinds};
use crate::placement::{self, PlacementDefaults};

const WATCH_RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub struct Reconciler {
    gateway: Arc<dyn UpsfGateway>,
    defaults: PlacementDefaults,
}

impl Reconciler {
    pub fn new(gateway: Arc<dyn UpsfGateway>, defaults: PlacementDefaults) -> Self {
        Self { gateway, defaults }
    }

    /// Runs the reconciliation loop until `stop` is cancelled. Shutdown is
    /// observed between events, never mid-placement.
    pub async fn run(&self, stop: CancellationToken) {
        self.map_all_inner().await;

        while !stop.is_cancelled() {
            tokio::select! {
                _ = stop.cancelled() => break,
                result = self.watch_once(&stop) => {
                    if let Err(err) = result {
                        tracing::error!(event = "watch stream error", error = %err);
                        tokio::select! {
                            _ = tokio::time::sleep(WATCH_RECONNECT_DELAY) => {},
                            _ = stop.cancelled() => break,
                        }
                    }
                },
            }
        }
    }

    async fn watch_once(&self, stop: &CancellationToken) -> Result<(), crate::gateway::UpsfError> {
        let mut stream = self.gateway.watch(WatchKinds::both()).await?;

        loop {
            tokio::select! {
                _ = stop.cancelled() => return Ok(()),
                next = stream.next() => {
                    match next {
                        None => return Ok(()),
                        Some(Err(err)) => return Err(err),
                        Some(Ok(event)) => self.handle_event(event).await,
                    }
                },
            }
            if stop.is_cancelled() {
                return Ok(());
            }
        }
    }

    /// Dispatch priority: a Shard event re-maps every session context; a
    /// Session Context event re-maps only itself (spec.md §9 Open
    /// Question 3 — shard preempts session-context, modeled here simply
    /// as two disjoint event variants rather than one record with two
    /// possibly-non-empty fields).
    async fn handle_event(&self, event: WatchEvent) {
        match event {
            WatchEvent::Shard(shard) if !shard.name.is_empty() => self.map_all_inner().await,
            WatchEvent::SessionContext(ctx) if !ctx.name.is_empty() => {
                if let Err(err) = placement::place(self.gateway.as_ref(), &ctx.name, &self.defaults).await
                {
                    tracing::error!(event = "placement error", sctx.name = %ctx.name, error = %err);
                }
            },
            _ => {},
        }
    }

    async fn map_all_inner(&self) {
        let contexts = match self.gateway.list_session_contexts().await {
            Ok(contexts) => contexts,
            Err(err) => {
                tracing::error!(event = "failed to list session contexts", error = %err);
                return;
            },
        };
        for ctx in contexts {
            if let Err(err) = placement::place(self.gateway.as_ref(), &ctx.name, &self.defaults).await
            {
                tracing::error!(event = "placement error", sctx.name = %ctx.name, error = %err);
            }
        }
    }
}
