// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Policy Loader (spec.md §4.3): parses declared default session contexts
//! from a YAML file, following the teacher's `serde_yaml` + `Config::load_from_file`
//! convention (`cfg::config::Config`).

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// One entry under `upsf.sessionContexts`. Any subset of the identifying
/// fields may be present; `services` expands the entry into one session
/// context per sub-entry, each inheriting unset fields from the parent.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEntry {
    pub name: Option<String>,
    #[serde(default = "default_customer_type")]
    pub customer_type: String,
    #[serde(default)]
    pub circuit_id: Option<String>,
    #[serde(default)]
    pub remote_id: Option<String>,
    #[serde(default)]
    pub source_mac_address: Option<String>,
    #[serde(default)]
    pub svlan: Option<String>,
    #[serde(default)]
    pub cvlan: Option<String>,
    #[serde(default)]
    pub shard: Option<String>,
    #[serde(default)]
    pub required_service_groups: Option<Vec<String>>,
    #[serde(default)]
    pub required_quality: Option<u32>,
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
}

fn default_customer_type() -> String {
    "residential".to_string()
}

/// A sub-entry of `services`; same identifying fields as [`PolicyEntry`],
/// minus `name`/`customerType` which only live on the parent.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    #[serde(default)]
    pub circuit_id: Option<String>,
    #[serde(default)]
    pub remote_id: Option<String>,
    #[serde(default)]
    pub source_mac_address: Option<String>,
    #[serde(default)]
    pub svlan: Option<String>,
    #[serde(default)]
    pub cvlan: Option<String>,
    #[serde(default)]
    pub shard: Option<String>,
    #[serde(default)]
    pub required_service_groups: Option<Vec<String>>,
    #[serde(default)]
    pub required_quality: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct UpsfSection {
    #[serde(default, rename = "sessionContexts")]
    session_contexts: Vec<PolicyEntry>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct PolicyDocument {
    #[serde(default)]
    upsf: UpsfSection,
}

/// One fully-resolved identifying tuple plus the fields to apply, produced
/// by expanding a [`PolicyEntry`] (and its `services`, if any).
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    pub name: String,
    pub customer_type: String,
    pub circuit_id: String,
    pub remote_id: String,
    pub source_mac_address: String,
    pub svlan: u32,
    pub cvlan: u32,
    pub shard: Option<String>,
    pub required_service_groups: Option<Vec<String>>,
    pub required_quality: Option<u32>,
}

/// Loads and expands the policy file at `path`.
///
/// Absence of the file, or an empty/`null` document, is a no-op — not an
/// error (spec.md §4.3, §7). Entries missing `name` are skipped with a
/// warning.
pub fn load_policy<P: AsRef<Path>>(path: P) -> Result<Vec<ResolvedEntry>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read policy file {path:?}"))?;

    let doc: Option<PolicyDocument> = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse policy YAML {path:?}"))?;
    let Some(doc) = doc else {
        return Ok(Vec::new());
    };

    let mut resolved = Vec::new();
    for entry in doc.upsf.session_contexts {
        let Some(name) = entry.name.clone() else {
            tracing::warn!(event = "policy entry missing name, skipping");
            continue;
        };

        if entry.services.is_empty() {
            resolved.push(resolve_single(&name, &entry));
        } else {
            for svc in &entry.services {
                resolved.push(resolve_with_service(&name, &entry, svc));
            }
        }
    }
    Ok(resolved)
}

fn parse_vlan(s: &Option<String>) -> u32 {
    s.as_deref()
        .unwrap_or("0")
        .parse()
        .unwrap_or(0)
}

fn resolve_single(name: &str, entry: &PolicyEntry) -> ResolvedEntry {
    ResolvedEntry {
        name: name.to_string(),
        customer_type: entry.customer_type.clone(),
        circuit_id: entry.circuit_id.clone().unwrap_or_default(),
        remote_id: entry.remote_id.clone().unwrap_or_default(),
        source_mac_address: entry.source_mac_address.clone().unwrap_or_default(),
        svlan: parse_vlan(&entry.svlan),
        cvlan: parse_vlan(&entry.cvlan),
        shard: entry.shard.clone().filter(|s| !s.is_empty()),
        required_service_groups: entry.required_service_groups.clone(),
        required_quality: entry.required_quality,
    }
}

fn resolve_with_service(name: &str, parent: &PolicyEntry, svc: &ServiceEntry) -> ResolvedEntry {
    ResolvedEntry {
        name: name.to_string(),
        customer_type: parent.customer_type.clone(),
        circuit_id: svc
            .circuit_id
            .clone()
            .or_else(|| parent.circuit_id.clone())
            .unwrap_or_default(),
        remote_id: svc
            .remote_id
            .clone()
            .or_else(|| parent.remote_id.clone())
            .unwrap_or_default(),
        source_mac_address: svc
            .source_mac_address
            .clone()
            .or_else(|| parent.source_mac_address.clone())
            .unwrap_or_default(),
        svlan: parse_vlan(&svc.svlan.clone().or_else(|| parent.svlan.clone())),
        cvlan: parse_vlan(&svc.cvlan.clone().or_else(|| parent.cvlan.clone())),
        shard: svc
            .shard
            .clone()
            .or_else(|| parent.shard.clone())
            .filter(|s| !s.is_empty()),
        required_service_groups: svc
            .required_service_groups
            .clone()
            .or_else(|| parent.required_service_groups.clone()),
        required_quality: svc.required_quality.or(parent.required_quality),
    }
}
