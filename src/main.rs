// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use clap::Parser;
use scm::cfg::logger::init_logger;
use scm::cfg::settings::{Cli, Settings};
use scm::supervisor;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings: Settings = cli.into();

    let _logger_guard = init_logger(&settings.loglevel).context("failed to initialize logger")?;

    supervisor::run(settings).await
}
