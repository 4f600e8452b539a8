// src/logging.rs

use std::sync::atomic::{AtomicBool, Ordering};

use plugbot_common::traits::LogControl;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use crate::Error;

/// `LogControl` backed by a reloadable `EnvFilter`.
pub struct ReloadLogControl {
    handle: reload::Handle<EnvFilter, Registry>,
    debug: AtomicBool,
}

fn filter_for(debug: bool) -> EnvFilter {
    EnvFilter::new(if debug { "debug" } else { "info" })
}

/// Installs the global subscriber. `RUST_LOG` wins over `debug` for the
/// initial filter; the `debug` command replaces it wholesale afterwards.
pub fn init_tracing(debug: bool) -> Result<ReloadLogControl, Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(debug));
    let (filter_layer, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer())
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to set global subscriber: {}", e)))?;
    Ok(ReloadLogControl {
        handle,
        debug: AtomicBool::new(debug),
    })
}

impl LogControl for ReloadLogControl {
    fn is_debug(&self) -> bool {
        self.debug.load(Ordering::SeqCst)
    }

    fn set_debug(&self, enabled: bool) -> Result<(), Error> {
        self.handle
            .modify(|f| *f = filter_for(enabled))
            .map_err(|e| Error::Config(e.to_string()))?;
        self.debug.store(enabled, Ordering::SeqCst);
        info!("Log level switched to {}", if enabled { "debug" } else { "info" });
        Ok(())
    }
}
