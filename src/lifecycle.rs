//! On-disk cache cleanup
//!
//! Every load attempt stages bytes under three per-model directories: the
//! upload staging area, the chunk-reassembly/deploy area, and the unpacked
//! working directory. Once a model is resident in memory (or a load has
//! failed), those disk copies are dead weight, so cleanup runs on the
//! success path, the failure path, and undeploy alike. All operations are
//! idempotent: a missing directory is a no-op, not an error.

use crate::config::DepotConfig;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Delete every cache directory belonging to one model id.
pub fn cleanup_caches(config: &DepotConfig, model_id: &str) {
    remove_dir_quietly(&config.upload_dir(model_id));
    remove_dir_quietly(&config.deploy_dir(model_id));
    remove_dir_quietly(&config.model_dir(model_id));
    debug!(model_id = %model_id, "Cleaned model caches");
}

/// Sweep the models root, deleting working directories for any model id not
/// in `resident`. Used at startup to reclaim space left by a crashed
/// process.
pub fn sweep_stale_caches(config: &DepotConfig, resident: &HashSet<String>) -> usize {
    let models_root = config.root_dir.join("models");
    let mut removed = 0;

    let entries = match std::fs::read_dir(&models_root) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let model_id = name.to_string_lossy().to_string();
        if !resident.contains(&model_id) {
            cleanup_caches(config, &model_id);
            removed += 1;
        }
    }

    if removed > 0 {
        debug!(removed = removed, "Swept stale model caches");
    }
    removed
}

/// Remove a directory tree, logging (not propagating) anything unexpected.
fn remove_dir_quietly(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove cache directory");
        }
    }
}
