// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Runtime settings, parsed from CLI flags with environment-variable and
//! built-in-default fallback (spec.md §6). Defaults match
//! `original_source/upsf_sess_ctx_manager/app.py:61-90`.

use std::time::Duration;

use clap::Parser;

fn default_required_service_groups() -> String {
    "basic-internet".to_string()
}

#[derive(Debug, Clone, Parser)]
#[command(name = "scm", about = "Session Context Manager: a UPSF placement agent")]
pub struct Cli {
    /// UPSF registry host.
    #[arg(long, env = "UPSF_HOST", default_value = "127.0.0.1")]
    pub upsf_host: String,

    /// UPSF registry port.
    #[arg(long, env = "UPSF_PORT", default_value_t = 50051)]
    pub upsf_port: u16,

    /// Path to the policy file (spec.md §4.3).
    #[arg(long, env = "CONFIG_FILE", default_value = "/etc/upsf/policy.yaml")]
    pub config_file: String,

    /// Shard name used when a session context carries no desired shard and
    /// no candidate is otherwise selectable. Reserved for future use; the
    /// current Placement Engine never falls back to it (spec.md §4.4).
    #[arg(long, env = "DEFAULT_SHARD_NAME", default_value = "default-shard")]
    pub default_shard_name: String,

    /// Quality value applied to a session context whose `requiredQuality`
    /// is unset.
    #[arg(long, env = "DEFAULT_REQUIRED_QUALITY", default_value_t = 1000)]
    pub default_required_quality: u32,

    /// Comma-separated service groups applied to a session context whose
    /// `requiredServiceGroups` is unset.
    #[arg(
        long,
        env = "DEFAULT_REQUIRED_SERVICE_GROUPS",
        default_value_t = default_required_service_groups()
    )]
    pub default_required_service_groups: String,

    /// Seconds between Periodic Materializer cycles.
    #[arg(long, env = "REGISTRATION_INTERVAL", default_value_t = 60)]
    pub registration_interval: u64,

    /// Whether the Periodic Materializer runs on a timer. Parsed via the
    /// source's boolean-from-string rule, not clap's native bool parsing
    /// (see [`parse_bool_yes_no`]).
    #[arg(
        long,
        env = "UPSF_AUTO_REGISTER",
        default_value = "yes",
        value_parser = parse_bool_yes_no
    )]
    pub upsf_auto_register: bool,

    /// Tracing env-filter directive, e.g. "info", "debug", "scm=debug".
    #[arg(long, env = "LOGLEVEL", default_value = "info")]
    pub loglevel: String,
}

/// `{true,1,t,y,yes}` case-insensitive parses to `true`; every other value,
/// including malformed input, parses to `false` rather than erroring —
/// matching `original_source/upsf_sess_ctx_manager/app.py`'s own
/// "anything unrecognized is falsy" convention.
fn parse_bool_yes_no(raw: &str) -> Result<bool, std::convert::Infallible> {
    Ok(matches!(
        raw.to_ascii_lowercase().as_str(),
        "true" | "1" | "t" | "y" | "yes"
    ))
}

/// Resolved, typed settings derived from [`Cli`]. Keeping this separate
/// from `Cli` lets the CLI struct stay a flat, clap-friendly shape while
/// the rest of the crate consumes already-parsed types (`Duration`,
/// `Vec<String>`).
#[derive(Debug, Clone)]
pub struct Settings {
    pub upsf_host: String,
    pub upsf_port: u16,
    pub config_file: String,
    pub default_shard_name: String,
    pub default_required_quality: u32,
    pub default_required_service_groups: Vec<String>,
    pub registration_interval: Duration,
    pub upsf_auto_register: bool,
    pub loglevel: String,
}

impl From<Cli> for Settings {
    fn from(cli: Cli) -> Self {
        let default_required_service_groups = cli
            .default_required_service_groups
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            upsf_host: cli.upsf_host,
            upsf_port: cli.upsf_port,
            config_file: cli.config_file,
            default_shard_name: cli.default_shard_name,
            default_required_quality: cli.default_required_quality,
            default_required_service_groups,
            registration_interval: Duration::from_secs(cli.registration_interval),
            upsf_auto_register: cli.upsf_auto_register,
            loglevel: cli.loglevel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_parser_accepts_known_truthy_forms() {
        for v in ["true", "TRUE", "1", "t", "Y", "yes", "Yes"] {
            assert!(parse_bool_yes_no(v).unwrap(), "expected {v} to be truthy");
        }
    }

    #[test]
    fn bool_parser_defaults_unknown_forms_to_false() {
        for v in ["no", "0", "false", "garbage", ""] {
            assert!(!parse_bool_yes_no(v).unwrap(), "expected {v} to be falsy");
        }
    }

    #[test]
    fn service_groups_split_and_trim() {
        let cli = Cli {
            upsf_host: "h".into(),
            upsf_port: 1,
            config_file: "c".into(),
            default_shard_name: "d".into(),
            default_required_quality: 1,
            default_required_service_groups: " basic , , voice ".into(),
            registration_interval: 1,
            upsf_auto_register: true,
            loglevel: "info".into(),
        };
        let settings: Settings = cli.into();
        assert_eq!(
            settings.default_required_service_groups,
            vec!["basic".to_string(), "voice".to_string()]
        );
    }
}
