//! Config hot-reload. A background thread watches the config file and
//! publishes a new snapshot on change; the batch already in flight keeps the
//! snapshot it started with, matching `ConfigWatch`'s documented contract in
//! `proxyhawk_core::config`. The one-shot CLI doesn't act on reloads itself —
//! this exists for embedders that run more than one batch per process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use proxyhawk_core::config::{Config, ConfigWatch};

use crate::config_io;

pub fn spawn(path: PathBuf, initial: Config) -> ConfigWatch {
	let (tx, rx) = tokio::sync::watch::channel(Arc::new(initial));
	std::thread::spawn(move || watch_loop(path, tx));
	rx
}

fn watch_loop(path: PathBuf, tx: tokio::sync::watch::Sender<Arc<Config>>) {
	let (fs_tx, fs_rx) = std::sync::mpsc::channel();
	let mut watcher: RecommendedWatcher = match notify::recommended_watcher(fs_tx) {
		Ok(w) => w,
		Err(e) => {
			tracing::warn!(error = %e, "config watcher failed to start");
			return;
		},
	};
	if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
		tracing::warn!(error = %e, path = %path.display(), "failed to watch config file");
		return;
	}

	for res in fs_rx {
		match res {
			Ok(_event) => {
				// Editors commonly write+rename in quick succession; coalesce
				// that burst into a single reload.
				std::thread::sleep(Duration::from_millis(300));
				match config_io::load(&path) {
					Ok(cfg) => {
						tracing::info!(path = %path.display(), "config reloaded");
						let _ = tx.send(Arc::new(cfg));
					},
					Err(e) => tracing::warn!(error = %e, "config reload failed, keeping previous snapshot"),
				}
			},
			Err(e) => tracing::warn!(error = %e, "config watch error"),
		}
	}
}
