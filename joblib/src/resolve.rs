use std::env;
use std::ffi::OsStr;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Locate the executable a job would run.
///
/// A program containing a path separator must name an executable file
/// (relative paths are taken from the current directory). A bare name is
/// searched for on `PATH`.
pub fn resolve_program(program: &OsStr) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        let candidate = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            env::current_dir().ok()?.join(candidate)
        };
        return is_executable(&candidate).then(|| candidate);
    }
    let search_path = env::var_os("PATH")?;
    env::split_paths(&search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(candidate))
        .find(|path| is_executable(path))
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
