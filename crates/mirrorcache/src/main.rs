//! Mirrorcache.
//!
//! Mirrorcache is a standalone pull-through cache for a remote file mirror.
//! The first request for a path fetches the object from the configured
//! upstream, verifies it, and stores it locally; all later requests for the
//! same path are served straight from disk without contacting the upstream
//! again.

#![warn(missing_docs, missing_debug_implementations, clippy::all)]

mod cli;
mod endpoints;
mod healthcheck;
mod logging;
mod server;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
