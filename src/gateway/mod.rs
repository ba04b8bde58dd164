// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The UPSF Gateway collaborator surface (spec.md §4.2): CRUD plus a
//! long-lived watch stream over Shards, SGUPs and Session Contexts.
//!
//! The wire protocol to the real UPSF is out of scope (spec.md §1); this
//! module defines the trait SCM is written against, plus an in-memory
//! reference implementation (`memory`) used by tests and local runs.

pub mod memory;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::model::{
    NewSessionContext, SessionContext, SessionContextUpdate, Sgup, SgupUpdate, Shard,
    ShardUpdate,
};

/// Recoverable failure from any UPSF operation (transport, server-side
/// rejection, or validation). SCM treats every variant as recoverable:
/// log and continue, or reconnect.
#[derive(Debug, Error)]
pub enum UpsfError {
    #[error("transport error talking to UPSF: {0}")]
    Transport(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
}

/// Which record kinds a [`UpsfGateway::watch`] subscription should deliver.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchKinds {
    pub shards: bool,
    pub session_contexts: bool,
}

impl WatchKinds {
    pub fn both() -> Self {
        Self {
            shards: true,
            session_contexts: true,
        }
    }
}

/// One mutation observed on the watch stream.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Shard(Shard),
    SessionContext(SessionContext),
}

pub type WatchStream = Pin<Box<dyn Stream<Item = Result<WatchEvent, UpsfError>> + Send>>;

/// Contract SCM consumes from the UPSF (spec.md §4.2). All reads are
/// point-in-time snapshots; all writes are partial updates (named fields
/// only) except `allocated_session_count`, which is always written as an
/// absolute value, never a delta.
#[async_trait]
pub trait UpsfGateway: Send + Sync {
    async fn list_shards(&self) -> Result<Vec<Shard>, UpsfError>;
    async fn list_sgups(&self) -> Result<Vec<Sgup>, UpsfError>;
    async fn list_session_contexts(&self) -> Result<Vec<SessionContext>, UpsfError>;

    async fn get_shard(&self, name: &str) -> Result<Shard, UpsfError>;
    async fn get_sgup(&self, name: &str) -> Result<Sgup, UpsfError>;

    async fn update_shard(&self, name: &str, update: ShardUpdate) -> Result<(), UpsfError>;
    async fn update_sgup(&self, name: &str, update: SgupUpdate) -> Result<(), UpsfError>;
    async fn update_session_context(
        &self,
        name: &str,
        update: SessionContextUpdate,
    ) -> Result<(), UpsfError>;

    /// Idempotent on `name`: if a session context with this name already
    /// exists, it is returned unchanged rather than recreated.
    async fn create_session_context(
        &self,
        name: &str,
        fields: NewSessionContext,
    ) -> Result<SessionContext, UpsfError>;

    async fn watch(&self, kinds: WatchKinds) -> Result<WatchStream, UpsfError>;
}
