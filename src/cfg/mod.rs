// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! This module handles configuration, command-line parsing, and logging.

/// Logger initialization.
pub mod logger;
/// Command-line parsing and the resolved runtime settings.
pub mod settings;
