//! `rtprelayd` entry point: parse CLI flags, set up logging, write the
//! pidfile, raise the fd-limit rlimit, and run the event loop.

use clap::Parser;
use tracing::{error, info};

use rtprelayd::config::{Args, RuntimeConfig};
use rtprelayd::eventloop::EventLoop;
use rtprelayd::utils::{setup_logging, LogFormat};
use rtprelayd::Result;

fn main() -> Result<()> {
    let args = Args::parse();
    let verbose = args.verbose;
    let cfg = RuntimeConfig::from_args(args)?;

    let _log_guard = setup_logging(verbose, None, LogFormat::Compact)?;
    info!(version = rtprelayd::VERSION, "{}", rtprelayd::DESCRIPTION);

    if let Some(nfiles) = cfg.max_files {
        raise_fd_limit(nfiles);
    }
    if let Some(pidfile) = &cfg.pidfile {
        write_pidfile(pidfile)?;
    }

    let mut event_loop = EventLoop::new(&cfg)?;
    let result = event_loop.run();
    event_loop.shutdown();

    if let Some(pidfile) = &cfg.pidfile {
        let _ = std::fs::remove_file(pidfile);
    }

    if let Err(e) = &result {
        error!(error = %e, "event loop exited with error");
    }
    result
}

fn raise_fd_limit(nfiles: u64) {
    // SAFETY: plain libc::setrlimit call with a stack-local struct; no
    // aliasing or lifetime concerns.
    unsafe {
        let limit = libc::rlimit {
            rlim_cur: nfiles,
            rlim_max: nfiles,
        };
        if libc::setrlimit(libc::RLIMIT_NOFILE, &limit) != 0 {
            tracing::warn!(nfiles, "failed to raise RLIMIT_NOFILE");
        }
    }
}

fn write_pidfile(path: &std::path::Path) -> Result<()> {
    std::fs::write(path, format!("{}\n", std::process::id()))?;
    Ok(())
}
