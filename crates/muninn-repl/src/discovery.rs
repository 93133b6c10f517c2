//! Plugin discovery: scans, in order, a user-plugins directory and a
//! working-directory-relative `plugins` directory for dynamically loadable
//! plugin libraries. A module that fails to load is logged
//! and skipped; it never aborts discovery.

use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use crate::plugin::{Plugin, PluginManager};

/// The entry point every plugin library must export.
const ENTRY_POINT: &[u8] = b"new_plugin";

/// Candidate shared-library extensions per platform.
fn is_loadable(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("so") | Some("dylib") | Some("dll")
    )
}

/// Directories scanned for plugin libraries, in scan order.
pub fn plugin_dirs(user_plugins_dir: Option<&Path>, cwd: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(dir) = user_plugins_dir {
        dirs.push(dir.to_path_buf());
    }
    dirs.push(cwd.join("plugins"));
    dirs
}

/// Candidate plugin library paths found under `dirs`. A missing or
/// unreadable directory is skipped, not an error.
pub fn candidates(dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for dir in dirs {
        let Ok(entries) = std::fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && is_loadable(&path) {
                found.push(path);
            }
        }
    }
    found
}

/// Load a single plugin library. The library must export a `new_plugin`
/// symbol of type `unsafe extern "C" fn() -> *mut std::ffi::c_void`,
/// returning `Box::into_raw(Box::new(Box::new(plugin) as Box<dyn Plugin>))
/// as *mut c_void` — a thin pointer to a heap-allocated `Box<dyn Plugin>`,
/// so the fat trait-object pointer never has to cross the `extern "C"`
/// boundary directly. Same-toolchain ABI assumption, as for any
/// process-local Rust plugin loader.
///
/// # Safety
/// The caller vouches the library at `path` genuinely exports `new_plugin`
/// with the expected signature and box layout; a mismatch is undefined
/// behavior.
pub unsafe fn load_plugin(path: &Path) -> crate::error::Result<(Library, Box<dyn Plugin>)> {
    unsafe {
        let lib = Library::new(path)
            .map_err(|e| crate::error::ReplError::Bootstrap(format!("{}: {e}", path.display())))?;
        let ctor: Symbol<unsafe extern "C" fn() -> *mut std::ffi::c_void> = lib
            .get(ENTRY_POINT)
            .map_err(|e| crate::error::ReplError::Bootstrap(format!("{}: {e}", path.display())))?;
        let raw = ctor();
        if raw.is_null() {
            return Err(crate::error::ReplError::Bootstrap(format!(
                "{}: new_plugin returned null",
                path.display()
            )));
        }
        let boxed: Box<Box<dyn Plugin>> = Box::from_raw(raw as *mut Box<dyn Plugin>);
        Ok((lib, *boxed))
    }
}

/// Discover and register every loadable plugin under `dirs` into `manager`.
/// Returns the libraries that registered successfully (the caller must keep
/// them alive for as long as the plugin's functions may be called) plus the
/// paths that failed, with their error messages, for logging.
pub async fn discover_and_register(
    manager: &PluginManager,
    dirs: &[PathBuf],
) -> (Vec<Library>, Vec<(PathBuf, String)>) {
    let mut loaded = Vec::new();
    let mut failures = Vec::new();

    for path in candidates(dirs) {
        // SAFETY: see `load_plugin`; any failure here is caught and the
        // module is skipped rather than aborting the scan.
        let outcome = unsafe { load_plugin(&path) };
        match outcome {
            Ok((lib, plugin)) => match manager.register(plugin).await {
                Ok(()) => loaded.push(lib),
                Err(e) => failures.push((path, e.to_string())),
            },
            Err(e) => failures.push((path, e.to_string())),
        }
    }

    (loaded, failures)
}
