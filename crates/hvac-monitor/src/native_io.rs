//! Native IO helper resolution for Windows
//!
//! The engine's optional native filesystem shim needs a helper executable
//! reachable through the search path. Resolution is pure over an
//! [`EnvProvider`] so it can be exercised without mutating the real process
//! environment: defaults are filled in only where unset, the helper is
//! probed, and the search path is touched only when the helper exists.
//! A missing helper is never fatal.

use colored::Colorize;
use std::path::{Path, PathBuf};

/// Home directory of the native IO library.
pub const NATIVE_HOME_VAR: &str = "HVAC_NATIVE_HOME";
/// Set to "true" to disable native file locking.
pub const FILE_LOCKING_VAR: &str = "HVAC_DISABLE_FILE_LOCKING";
/// Process search path.
pub const PATH_VAR: &str = "PATH";

const DEFAULT_NATIVE_HOME: &str = r"C:\hvac\native";
const HELPER_EXE: &str = "ioshim.exe";

/// Minimal view of the process environment.
pub trait EnvProvider {
    fn var(&self, key: &str) -> Option<String>;
    fn set_var(&mut self, key: &str, value: &str);
    fn path_exists(&self, path: &Path) -> bool;

    /// Separator between search-path entries.
    fn path_separator(&self) -> char {
        if cfg!(windows) {
            ';'
        } else {
            ':'
        }
    }
}

/// The real process environment.
pub struct SystemEnv;

impl EnvProvider for SystemEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn set_var(&mut self, key: &str, value: &str) {
        std::env::set_var(key, value);
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Outcome of native helper resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeIoStatus {
    /// Helper executable found; its directory was prepended to the search
    /// path.
    Found { helper: PathBuf },
    /// Helper not found at the probed location; search path left untouched.
    Missing { probed: PathBuf },
}

/// Fill environment defaults, probe for the native helper, and prepend its
/// directory to the search path when present.
pub fn resolve<E: EnvProvider>(env: &mut E) -> NativeIoStatus {
    if env.var(NATIVE_HOME_VAR).is_none() {
        env.set_var(NATIVE_HOME_VAR, DEFAULT_NATIVE_HOME);
    }
    if env.var(FILE_LOCKING_VAR).is_none() {
        env.set_var(FILE_LOCKING_VAR, "true");
    }

    let home = env.var(NATIVE_HOME_VAR).unwrap_or_default();
    let helper = Path::new(&home).join("bin").join(HELPER_EXE);

    if env.path_exists(&helper) {
        let helper_dir = helper
            .parent()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default();
        let path = match env.var(PATH_VAR) {
            Some(existing) => format!("{helper_dir}{}{existing}", env.path_separator()),
            None => helper_dir,
        };
        env.set_var(PATH_VAR, &path);
        NativeIoStatus::Found { helper }
    } else {
        NativeIoStatus::Missing { probed: helper }
    }
}

/// Print the resolution outcome and the resolved variable values.
pub fn report<E: EnvProvider>(status: &NativeIoStatus, env: &E) {
    match status {
        NativeIoStatus::Found { helper } => {
            println!(
                "{} Found {} at: {}",
                "✓".bright_green(),
                HELPER_EXE,
                helper.display()
            );
        }
        NativeIoStatus::Missing { probed } => {
            println!(
                "{} {} not found at: {}",
                "!".bright_yellow(),
                HELPER_EXE,
                probed.display()
            );
            println!(
                "On Windows, place a {} matching your native library version under {}\\bin.",
                HELPER_EXE, NATIVE_HOME_VAR
            );
            println!(
                "Common fixes: set {} to the folder containing bin\\{}, or run the monitor under WSL to avoid Windows native IO.",
                NATIVE_HOME_VAR, HELPER_EXE
            );
        }
    }

    println!(
        "{}={}",
        NATIVE_HOME_VAR,
        env.var(NATIVE_HOME_VAR).unwrap_or_default()
    );
    println!(
        "{}={}",
        FILE_LOCKING_VAR,
        env.var(FILE_LOCKING_VAR).unwrap_or_default()
    );
}

/// Resolve against the real process environment and print the outcome.
/// The native shim only exists on Windows; elsewhere this is a no-op.
pub fn configure() {
    if cfg!(windows) {
        let mut env = SystemEnv;
        let status = resolve(&mut env);
        report(&status, &env);
    }
}
