// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! In-memory reference [`UpsfGateway`] implementation.
//!
//! Storage shape follows the teacher's `client::pool_sessions::Pool`: one
//! `DashMap` keyed by entity name per record kind, giving lock-free
//! per-key access under concurrent placement. Mutations fan out to
//! subscribers of `watch()` via a `tokio::sync::broadcast` channel, the
//! same "bounded channel behind `Arc`" shape the teacher uses for
//! unsolicited NOP delivery (`client::client::ClientConnection`).

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::{UpsfError, UpsfGateway, WatchEvent, WatchKinds, WatchStream};
use crate::model::{
    NewSessionContext, SessionContext, SessionContextUpdate, Sgup, SgupUpdate, Shard,
    ShardUpdate,
};

const WATCH_CHANNEL_CAPACITY: usize = 1024;

/// Simple in-process stand-in for the UPSF registry. Not a performance
/// target: it exists so the Placement Engine, Reconciler and Periodic
/// Materializer can be exercised without a live gRPC server.
pub struct InMemoryUpsf {
    shards: DashMap<String, Shard>,
    sgups: DashMap<String, Sgup>,
    session_contexts: DashMap<String, SessionContext>,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryUpsf {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryUpsf {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            shards: DashMap::new(),
            sgups: DashMap::new(),
            session_contexts: DashMap::new(),
            events,
        }
    }

    /// Seeds a shard directly, bypassing the watch notification. Intended
    /// for test fixtures.
    pub fn put_shard(&self, shard: Shard) {
        self.shards.insert(shard.name.clone(), shard);
    }

    /// Seeds an SGUP directly, bypassing the watch notification. Intended
    /// for test fixtures.
    pub fn put_sgup(&self, sgup: Sgup) {
        self.sgups.insert(sgup.name.clone(), sgup);
    }

    /// Seeds a session context directly, bypassing the watch notification.
    /// Intended for test fixtures.
    pub fn put_session_context(&self, ctx: SessionContext) {
        self.session_contexts.insert(ctx.name.clone(), ctx);
    }

    fn notify(&self, event: WatchEvent) {
        // No subscribers is not an error: the event is simply dropped.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl UpsfGateway for InMemoryUpsf {
    async fn list_shards(&self) -> Result<Vec<Shard>, UpsfError> {
        Ok(self.shards.iter().map(|e| e.value().clone()).collect())
    }

    async fn list_sgups(&self) -> Result<Vec<Sgup>, UpsfError> {
        Ok(self.sgups.iter().map(|e| e.value().clone()).collect())
    }

    async fn list_session_contexts(&self) -> Result<Vec<SessionContext>, UpsfError> {
        Ok(self
            .session_contexts
            .iter()
            .map(|e| e.value().clone())
            .collect())
    }

    async fn get_shard(&self, name: &str) -> Result<Shard, UpsfError> {
        self.shards
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| UpsfError::NotFound(format!("shard {name}")))
    }

    async fn get_sgup(&self, name: &str) -> Result<Sgup, UpsfError> {
        self.sgups
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| UpsfError::NotFound(format!("sgup {name}")))
    }

    async fn update_shard(&self, name: &str, update: ShardUpdate) -> Result<(), UpsfError> {
        let mut entry = self
            .shards
            .get_mut(name)
            .ok_or_else(|| UpsfError::NotFound(format!("shard {name}")))?;
        if let Some(count) = update.allocated_session_count {
            entry.allocated_session_count = count;
        }
        let updated = entry.value().clone();
        drop(entry);
        self.notify(WatchEvent::Shard(updated));
        Ok(())
    }

    async fn update_sgup(&self, name: &str, update: SgupUpdate) -> Result<(), UpsfError> {
        let mut entry = self
            .sgups
            .get_mut(name)
            .ok_or_else(|| UpsfError::NotFound(format!("sgup {name}")))?;
        if let Some(count) = update.allocated_session_count {
            entry.allocated_session_count = count;
        }
        Ok(())
    }

    async fn update_session_context(
        &self,
        name: &str,
        update: SessionContextUpdate,
    ) -> Result<(), UpsfError> {
        let mut entry = self
            .session_contexts
            .get_mut(name)
            .ok_or_else(|| UpsfError::NotFound(format!("session context {name}")))?;
        if let Some(q) = update.required_quality {
            entry.required_quality = q;
        }
        if let Some(rsgs) = update.required_service_groups {
            entry.required_service_groups = rsgs;
        }
        if let Some(shard) = update.desired_shard {
            entry.desired_shard = Some(shard);
        }
        let updated = entry.value().clone();
        drop(entry);
        self.notify(WatchEvent::SessionContext(updated));
        Ok(())
    }

    async fn create_session_context(
        &self,
        name: &str,
        fields: NewSessionContext,
    ) -> Result<SessionContext, UpsfError> {
        if let Some(existing) = self.session_contexts.get(name) {
            return Ok(existing.value().clone());
        }
        let ctx = SessionContext {
            name: name.to_string(),
            filter: fields.filter,
            circuit_id: fields.circuit_id,
            remote_id: fields.remote_id,
            required_service_groups: fields.required_service_groups,
            required_quality: fields.required_quality,
            desired_shard: fields.desired_shard,
            current_state: Default::default(),
            derived_state: Default::default(),
            description: fields.description,
        };
        self.session_contexts.insert(name.to_string(), ctx.clone());
        self.notify(WatchEvent::SessionContext(ctx.clone()));
        Ok(ctx)
    }

    async fn watch(&self, kinds: WatchKinds) -> Result<WatchStream, UpsfError> {
        let rx = self.events.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(move |item| {
            let kinds = kinds;
            async move {
                match item {
                    Ok(WatchEvent::Shard(s)) if kinds.shards => {
                        Some(Ok(WatchEvent::Shard(s)))
                    },
                    Ok(WatchEvent::SessionContext(s)) if kinds.session_contexts => {
                        Some(Ok(WatchEvent::SessionContext(s)))
                    },
                    Ok(_) => None,
                    Err(_lagged) => {
                        // Receiver fell behind; skip the gap rather than
                        // surfacing a spurious transport error.
                        None
                    },
                }
            }
        });
        Ok(Box::pin(stream))
    }
}
