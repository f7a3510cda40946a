/*
 * This file is part of axetune.
 *
 * Copyright (C) 2025 axetune contributors
 *
 * axetune is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * axetune is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with axetune. If not, see <https://www.gnu.org/licenses/>.
 */

use std::io;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use at_core::{load_config_or_default, CancelToken};
use axetune::cli::{Cli, Commands};
use axetune::commands::{cmd_apply_csv, cmd_monitor, cmd_status, cmd_sweep, Session};
use axetune::logger;
use axetune::operator::ConsoleOperator;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logger::init_logging(cli.log_to.as_deref()) {
        eprintln!("Warning: {:#}", e);
    }

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut config =
        load_config_or_default(cli.config.as_deref()).context("loading configuration")?;
    cli.apply_to(&mut config);

    // Ctrl-C only raises the flag; the engine stops at its next tick and
    // still rolls the miner back.
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: interrupt received, stopping at the next checkpoint");
        handler_token.cancel();
    }) {
        warn!("Failed to set signal handler: {}. Ctrl-C will not roll back settings.", e);
    }

    let session = Session::open(config, cli.simulate, cancel);
    let stdin = io::stdin();
    let mut operator = ConsoleOperator::new(stdin.lock(), io::stdout());

    match &cli.command {
        Commands::Status => cmd_status(&session, &mut io::stdout()),
        Commands::Sweep(args) => {
            let mut operator = operator.with_auto_apply(args.auto_apply);
            cmd_sweep(session, args, &mut operator)
        }
        Commands::ApplyCsv { file, dry_run } => {
            cmd_apply_csv(session, file, *dry_run, &mut operator)
        }
        Commands::Monitor {
            interval,
            duration,
            log_file,
        } => cmd_monitor(&session, *interval, *duration, log_file.as_deref()),
    }
}
