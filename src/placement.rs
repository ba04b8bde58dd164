// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Placement Engine (spec.md §4.4): two-stage least-loaded selection of an
//! SGUP and a Shard for a session context, filtered by capability and
//! capacity, with an atomic-per-invocation bump of both counters.

use std::collections::HashSet;

use crate::gateway::{UpsfError, UpsfGateway};
use crate::model::{Sgup, SessionContextUpdate, Shard};

/// Configured fallbacks applied in Step A when a session context arrives
/// with an unset `required_quality` or `required_service_groups`.
#[derive(Debug, Clone)]
pub struct PlacementDefaults {
    pub default_required_quality: u32,
    pub default_required_service_groups: Vec<String>,
}

/// Places a single session context, identified by `name`, against the
/// current UPSF snapshot. Implements Steps A through H of spec.md §4.4.
///
/// Any [`UpsfError`] during Steps C-H ends the invocation without rolling
/// back partial counter bumps already written (spec.md §4.4 Edge
/// policies) — the discrepancy self-heals on the next watch tick.
pub async fn place(
    gateway: &dyn UpsfGateway,
    name: &str,
    defaults: &PlacementDefaults,
) -> Result<(), UpsfError> {
    let mut ctx = gateway
        .list_session_contexts()
        .await?
        .into_iter()
        .find(|c| c.name == name)
        .ok_or_else(|| UpsfError::NotFound(format!("session context {name}")))?;

    let mut update = SessionContextUpdate::default();

    // Step A: defaults fill.
    if ctx.needs_quality_default() {
        update.required_quality = Some(defaults.default_required_quality);
        ctx.required_quality = defaults.default_required_quality;
    }
    if ctx.needs_service_group_default() {
        update.required_service_groups = Some(defaults.default_required_service_groups.clone());
        ctx.required_service_groups = defaults.default_required_service_groups.clone();
    }

    // Step B: short-circuit if desired_shard is already set.
    if ctx.has_desired_shard() {
        return commit(gateway, name, update).await;
    }

    // Edge policy: missing/zero required_service_groups after defaults ->
    // only Step A writes back, no placement attempted.
    if ctx.needs_service_group_default() {
        return commit(gateway, name, update).await;
    }

    // Step C: SGUP candidate set.
    let shards = gateway.list_shards().await?;
    let sgups = gateway.list_sgups().await?;

    if shards.is_empty() {
        tracing::warn!(event = "map_session: no shards available");
        return commit(gateway, name, update).await;
    }
    if sgups.is_empty() {
        tracing::warn!(
            event = "map_session: no service gateway user planes available"
        );
        return commit(gateway, name, update).await;
    }

    let hosted_sgups: HashSet<&str> = shards.iter().map(|s| s.desired_sgup.as_str()).collect();

    let sgup_candidates: Vec<&Sgup> = sgups
        .iter()
        .filter(|sgup| {
            hosted_sgups.contains(sgup.name.as_str())
                && sgup.supports(&ctx.required_service_groups)
                && sgup.has_capacity()
        })
        .collect();

    if sgup_candidates.is_empty() {
        tracing::warn!(
            event = "no sgup candidates available for session context, ignoring",
            sctx.name = name,
        );
        return commit(gateway, name, update).await;
    }

    // Step D: pick least-loaded SGUP, ties broken lexicographically by name.
    let chosen_sgup = least_loaded(&sgup_candidates, |s| s.load(), |s| s.name.as_str());

    // Step E: shard candidate set for the chosen SGUP.
    let shard_candidates: Vec<&Shard> = shards
        .iter()
        .filter(|shard| shard.desired_sgup == chosen_sgup.name && shard.has_capacity())
        .collect();

    if shard_candidates.is_empty() {
        tracing::warn!(
            event = "no shard candidates available for session context, ignoring",
            sctx.name = name,
        );
        return commit(gateway, name, update).await;
    }

    // Step F: pick least-loaded shard, same tie-break rule.
    let chosen_shard = least_loaded(&shard_candidates, |s| s.load(), |s| s.name.as_str());

    // Step G: counter bump. Shard uses the already-read snapshot; the SGUP
    // is re-read once immediately before its own bump (spec.md §4.4 Step
    // G.2, §9 Open Question 1).
    gateway
        .update_shard(
            &chosen_shard.name,
            crate::model::ShardUpdate {
                allocated_session_count: Some(chosen_shard.allocated_session_count + 1),
            },
        )
        .await?;

    let sgup_reread = gateway.get_sgup(&chosen_sgup.name).await?;
    gateway
        .update_sgup(
            &chosen_sgup.name,
            crate::model::SgupUpdate {
                allocated_session_count: Some(sgup_reread.allocated_session_count + 1),
            },
        )
        .await?;

    update.desired_shard = Some(chosen_shard.name.clone());

    // Step H: commit.
    commit(gateway, name, update).await
}

async fn commit(
    gateway: &dyn UpsfGateway,
    name: &str,
    update: SessionContextUpdate,
) -> Result<(), UpsfError> {
    if update.is_empty() {
        return Ok(());
    }
    tracing::info!(event = "updating session context", sctx.name = name);
    gateway.update_session_context(name, update).await
}

/// Selects the item with minimum load, breaking ties by ascending name
/// (REDESIGN FLAG: deterministic, iteration-order-independent tie-break).
/// Callers guarantee every candidate has `Some` load (capacity > 0).
fn least_loaded<'a, T>(
    candidates: &[&'a T],
    load: impl Fn(&T) -> Option<f64>,
    name: impl Fn(&T) -> &str,
) -> &'a T {
    candidates
        .iter()
        .copied()
        .min_by(|a, b| {
            let la = load(a).unwrap_or(f64::INFINITY);
            let lb = load(b).unwrap_or(f64::INFINITY);
            la.partial_cmp(&lb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| name(a).cmp(name(b)))
        })
        .expect("candidates is non-empty")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::gateway::memory::InMemoryUpsf;
    use crate::model::{CurrentState, DerivedState, SessionContext, SessionContextFilter};

    fn defaults() -> PlacementDefaults {
        PlacementDefaults {
            default_required_quality: 1000,
            default_required_service_groups: vec!["basic-internet".to_string()],
        }
    }

    fn ctx(name: &str, rsgs: &[&str]) -> SessionContext {
        SessionContext {
            name: name.to_string(),
            filter: SessionContextFilter::default(),
            circuit_id: String::new(),
            remote_id: String::new(),
            required_service_groups: rsgs.iter().map(|s| s.to_string()).collect(),
            required_quality: 0,
            desired_shard: None,
            current_state: CurrentState::default(),
            derived_state: DerivedState::default(),
            description: String::new(),
        }
    }

    fn sgup(name: &str, groups: &[&str], max: u64, alloc: u64) -> Sgup {
        Sgup {
            name: name.to_string(),
            supported_service_groups: groups.iter().map(|s| s.to_string()).collect::<HashSet<_>>(),
            max_session_count: max,
            allocated_session_count: alloc,
        }
    }

    fn shard(name: &str, sgup: &str, max: u64, alloc: u64) -> Shard {
        Shard {
            name: name.to_string(),
            desired_sgup: sgup.to_string(),
            max_session_count: max,
            allocated_session_count: alloc,
        }
    }

    // S1: single candidate.
    #[tokio::test]
    async fn single_candidate_places_and_bumps_both_counters() {
        let upsf = InMemoryUpsf::new();
        upsf.put_sgup(sgup("A", &["basic"], 100, 0));
        upsf.put_shard(shard("X", "A", 50, 0));
        upsf.put_session_context(ctx("ctx1", &["basic"]));

        place(&upsf, "ctx1", &defaults()).await.unwrap();

        let updated = upsf.get_shard("X").await.unwrap();
        assert_eq!(updated.allocated_session_count, 1);
        let sgup_updated = upsf.get_sgup("A").await.unwrap();
        assert_eq!(sgup_updated.allocated_session_count, 1);
        let sctx = upsf
            .list_session_contexts()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.name == "ctx1")
            .unwrap();
        assert_eq!(sctx.desired_shard.as_deref(), Some("X"));
    }

    // S2: load-based selection.
    #[tokio::test]
    async fn picks_least_loaded_sgup() {
        let upsf = InMemoryUpsf::new();
        upsf.put_sgup(sgup("A", &["basic"], 100, 90));
        upsf.put_sgup(sgup("B", &["basic"], 100, 10));
        upsf.put_shard(shard("X", "A", 50, 0));
        upsf.put_shard(shard("Y", "B", 50, 0));
        upsf.put_session_context(ctx("ctx1", &["basic"]));

        place(&upsf, "ctx1", &defaults()).await.unwrap();

        let sctx = upsf
            .list_session_contexts()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.name == "ctx1")
            .unwrap();
        assert_eq!(sctx.desired_shard.as_deref(), Some("Y"));
    }

    // S3: capability filter dominates load.
    #[tokio::test]
    async fn capability_filter_overrides_load() {
        let upsf = InMemoryUpsf::new();
        upsf.put_sgup(sgup("A", &["basic"], 100, 0));
        upsf.put_sgup(sgup("B", &["basic", "premium"], 100, 50));
        upsf.put_shard(shard("X", "A", 50, 0));
        upsf.put_shard(shard("Y", "B", 50, 0));
        upsf.put_session_context(ctx("ctx1", &["premium"]));

        place(&upsf, "ctx1", &defaults()).await.unwrap();

        let sctx = upsf
            .list_session_contexts()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.name == "ctx1")
            .unwrap();
        assert_eq!(sctx.desired_shard.as_deref(), Some("Y"));
    }

    // S4: full capacity, no placement.
    #[tokio::test]
    async fn full_capacity_yields_no_placement() {
        let upsf = InMemoryUpsf::new();
        upsf.put_sgup(sgup("A", &["basic"], 100, 100));
        upsf.put_shard(shard("X", "A", 50, 0));
        upsf.put_session_context(ctx("ctx1", &["basic"]));

        place(&upsf, "ctx1", &defaults()).await.unwrap();

        let sctx = upsf
            .list_session_contexts()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.name == "ctx1")
            .unwrap();
        assert_eq!(sctx.desired_shard, None);
    }

    // Invariant 2: a session context with a non-empty desired_shard is
    // never re-placed.
    #[tokio::test]
    async fn already_placed_context_is_not_remapped() {
        let upsf = InMemoryUpsf::new();
        upsf.put_sgup(sgup("A", &["basic"], 100, 50));
        upsf.put_shard(shard("X", "A", 50, 25));
        let mut c = ctx("ctx1", &["basic"]);
        c.desired_shard = Some("X".to_string());
        c.required_quality = 1000;
        upsf.put_session_context(c);

        place(&upsf, "ctx1", &defaults()).await.unwrap();

        let shard_after = upsf.get_shard("X").await.unwrap();
        assert_eq!(shard_after.allocated_session_count, 25);
        let sgup_after = upsf.get_sgup("A").await.unwrap();
        assert_eq!(sgup_after.allocated_session_count, 50);
    }

    // Edge policy: missing required_service_groups after defaults skips
    // placement entirely, but Step A quality default still lands.
    #[tokio::test]
    async fn missing_service_groups_after_defaults_skips_placement() {
        let upsf = InMemoryUpsf::new();
        upsf.put_sgup(sgup("A", &[], 100, 0));
        upsf.put_shard(shard("X", "A", 50, 0));
        let defaults_empty_rsg = PlacementDefaults {
            default_required_quality: 1000,
            default_required_service_groups: vec![],
        };
        upsf.put_session_context(ctx("ctx1", &[]));

        place(&upsf, "ctx1", &defaults_empty_rsg).await.unwrap();

        let sctx = upsf
            .list_session_contexts()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.name == "ctx1")
            .unwrap();
        assert_eq!(sctx.desired_shard, None);
        assert_eq!(sctx.required_quality, 1000);
    }

    // Invariant 6: an SGUP not referenced by any shard is never chosen.
    #[tokio::test]
    async fn orphan_sgup_is_never_chosen() {
        let upsf = InMemoryUpsf::new();
        upsf.put_sgup(sgup("A", &["basic"], 100, 0)); // not hosted by any shard
        upsf.put_sgup(sgup("B", &["basic"], 100, 0));
        upsf.put_shard(shard("X", "B", 50, 0));
        upsf.put_session_context(ctx("ctx1", &["basic"]));

        place(&upsf, "ctx1", &defaults()).await.unwrap();

        let sctx = upsf
            .list_session_contexts()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.name == "ctx1")
            .unwrap();
        assert_eq!(sctx.desired_shard.as_deref(), Some("X"));
    }
}
