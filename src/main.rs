// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! spacey-mock CLI - inspect how a mock setup routes module loads

mod repl;

use anyhow::Context;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use spacey_mock::{Decision, Manifest, MockSession, ModuleContext, Requester, VERSION};
use spacey_mock_host::{ModuleLoader, RealFs};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "spacey-mock",
    about = "Inspect and drive module mocks for the Spacey runtime",
    version = VERSION,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Mock manifest (TOML, or JSON by extension)
    #[arg(short, long, global = true)]
    manifest: Option<PathBuf>,

    /// The test file requests are made from
    #[arg(short, long, global = true, default_value = "test.js")]
    entry: PathBuf,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print what each request would load
    Explain {
        /// Module chain between the entry and the requester, outermost first
        #[arg(long = "from")]
        from: Vec<PathBuf>,

        /// Requests; read line by line from stdin when omitted
        requests: Vec<String>,
    },
    /// Build a session interactively
    Repl,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "spacey_mock=debug,spacey_mock_host=debug"
    } else {
        "spacey_mock=warn,spacey_mock_host=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let session = open_session(cli.manifest.as_deref(), &cli.entry)?;

    match cli.command {
        Some(Command::Explain { from, requests }) => explain(&session, &from, requests),
        Some(Command::Repl) => run_repl(session),
        None if atty::is(atty::Stream::Stdin) => run_repl(session),
        None => explain(&session, &[], Vec::new()),
    }
}

/// A session over the real file system, with `manifest` applied
fn open_session(manifest: Option<&Path>, entry: &Path) -> anyhow::Result<MockSession> {
    let entry = std::path::absolute(entry)
        .with_context(|| format!("cannot make {} absolute", entry.display()))?;
    let loader = Arc::new(ModuleLoader::new(Arc::new(RealFs)));
    let session = MockSession::new(loader, ModuleContext::root(entry.as_path()));

    if let Some(path) = manifest {
        let manifest = Manifest::from_path(path)
            .with_context(|| format!("failed to load manifest {}", path.display()))?;
        session.apply_manifest(&manifest)?;
    }
    Ok(session)
}

fn explain(
    session: &MockSession,
    from: &[PathBuf],
    requests: Vec<String>,
) -> anyhow::Result<ExitCode> {
    let mut requester: Requester = session.entry_point();
    for module in from {
        let module = std::path::absolute(module)
            .with_context(|| format!("cannot make {} absolute", module.display()))?;
        requester = ModuleContext::child(&requester, module.as_path());
    }

    let requests = if requests.is_empty() {
        std::io::stdin()
            .lock()
            .lines()
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect()
    } else {
        requests
    };

    let mut failed = false;
    for request in &requests {
        match session.explain(request, &requester) {
            Ok(decision) => {
                failed |= matches!(decision, Decision::Rejected { .. });
                println!("{}", repl::format_decision(request, &decision));
            }
            Err(err) => {
                failed = true;
                println!("{:30} {}", request, err.red());
            }
        }
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn run_repl(session: MockSession) -> anyhow::Result<ExitCode> {
    let mut repl = repl::Repl::new(session).context("failed to initialize REPL")?;
    repl.run()?;
    Ok(ExitCode::SUCCESS)
}
