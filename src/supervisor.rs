// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Supervisor (spec.md §4.7): wires the gateway, Policy Loader,
//! Reconciler and Periodic Materializer together and owns the process
//! lifetime.

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::cfg::settings::Settings;
use crate::gateway::UpsfGateway;
use crate::gateway::memory::InMemoryUpsf;
use crate::materializer::PeriodicMaterializer;
use crate::placement::PlacementDefaults;
use crate::reconciler::Reconciler;

/// Runs the agent until `SIGINT`/`ctrl_c`, then shuts down cleanly.
///
/// The wire transport to a live UPSF registry is out of scope for this
/// crate (spec.md §6); [`InMemoryUpsf`] is the only [`UpsfGateway`]
/// shipped, constructed fresh here and shared by both background tasks.
pub async fn run(settings: Settings) -> Result<()> {
    tracing::info!(
        event = "starting",
        upsf.host = %settings.upsf_host,
        upsf.port = settings.upsf_port,
        config.file = %settings.config_file,
    );

    let gateway: Arc<dyn UpsfGateway> = Arc::new(InMemoryUpsf::new());
    let defaults = PlacementDefaults {
        default_required_quality: settings.default_required_quality,
        default_required_service_groups: settings.default_required_service_groups.clone(),
    };

    let materializer = PeriodicMaterializer::new(
        gateway.clone(),
        settings.config_file.clone().into(),
        settings.registration_interval,
    );

    // Initial materialization always runs once, regardless of
    // `upsf_auto_register` — only the recurring timer is gated by it
    // (spec.md §4.6, matching `original_source/app.py:116-132`).
    materializer.materialize_once().await;

    let reconciler = Reconciler::new(gateway.clone(), defaults);
    let stop = CancellationToken::new();

    let reconciler_handle = {
        let stop = stop.clone();
        tokio::task::spawn(async move { reconciler.run(stop).await })
    };

    let materializer_handle = if settings.upsf_auto_register {
        let stop = stop.clone();
        Some(tokio::task::spawn(
            async move { materializer.run(stop).await },
        ))
    } else {
        tracing::info!(event = "periodic materialization disabled");
        None
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!(event = "shutdown signal received");
    stop.cancel();

    reconciler_handle.await?;
    if let Some(handle) = materializer_handle {
        handle.await?;
    }

    tracing::info!(event = "stopped");
    Ok(())
}
