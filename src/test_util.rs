use std::sync::Mutex;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn restore(key: &str, old: Option<String>) {
    // SAFETY: callers hold ENV_MUTEX, so no other test touches the environment.
    unsafe {
        match old {
            Some(value) => std::env::set_var(key, value),
            None => std::env::remove_var(key),
        }
    }
}

/// Runs `func` with `HOME` pointing at a fresh temporary directory.
pub(crate) fn with_temp_home<F, R>(func: F) -> R
where
    F: FnOnce(&std::path::Path) -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let dir = tempfile::tempdir().expect("tempdir");
    let old_home = std::env::var("HOME").ok();
    // SAFETY: guarded by ENV_MUTEX.
    unsafe { std::env::set_var("HOME", dir.path()) };
    let result = func(dir.path());
    restore("HOME", old_home);
    result
}

/// Sets or clears one variable for the duration of `func`. Only call this
/// inside [`with_temp_home`], which holds the environment lock.
pub(crate) fn with_env_var<F, R>(key: &str, value: Option<&str>, func: F) -> R
where
    F: FnOnce() -> R,
{
    let old = std::env::var(key).ok();
    // SAFETY: guarded by ENV_MUTEX through with_temp_home.
    unsafe {
        match value {
            Some(value) => std::env::set_var(key, value),
            None => std::env::remove_var(key),
        }
    }
    let result = func();
    restore(key, old);
    result
}

/// Writes an executable shell script into `dir` and returns its path.
#[cfg(unix)]
pub(crate) fn write_script(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}
