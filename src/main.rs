use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use fifotty::session;
use fifotty::signals::SignalChannel;
use fifotty::RelayExit;

/// Attach the current terminal to a process over a pair of named pipes.
///
/// The remote process opens INBOUND for writing and OUTBOUND for reading:
/// whatever it writes is echoed here, and keystrokes typed here are
/// forwarded to it. Both pipes are created at startup and removed on exit.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Named pipe the remote process writes into.
    inbound: PathBuf,

    /// Named pipe the remote process reads from.
    outbound: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    fifotty::logging::init();

    #[cfg(target_os = "linux")]
    allow_external_ptrace();

    match run(&cli) {
        Ok(exit) => {
            info!(?exit, "session ended");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("fifotty: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<RelayExit> {
    let signals = SignalChannel::install().context("installing signal handlers")?;
    let exit = session::attach(
        &cli.inbound,
        &cli.outbound,
        signals,
        io::stdin(),
        io::stdout(),
    )?;
    Ok(exit)
}

/// Permit any process to ptrace this one. The session exists so a debugger
/// can reach a process whose stdio is redirected; Yama's ptrace_scope would
/// otherwise block non-ancestor tracers from attaching here.
#[cfg(target_os = "linux")]
fn allow_external_ptrace() {
    // SAFETY: prctl(PR_SET_PTRACER) only adjusts this process's ptrace
    // attach policy.
    let ret = unsafe { libc::prctl(libc::PR_SET_PTRACER, libc::PR_SET_PTRACER_ANY) };
    if ret != 0 {
        tracing::debug!(error = %io::Error::last_os_error(), "prctl(PR_SET_PTRACER) failed");
    }
}
