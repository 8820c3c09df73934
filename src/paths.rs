use std::path::{Path, PathBuf};

const BASE_DIR_ENV: &str = "LAYOUT_EXTRACTOR_RUST_DIR";
const BASE_DIR_NAME: &str = ".layout-extractor-rust";

/// Directory holding the user's `settings.toml`.
pub(crate) fn settings_dir() -> Option<PathBuf> {
    if let Some(dir) = base_dir_override() {
        return Some(dir);
    }
    home_join(BASE_DIR_NAME)
}

/// Default location for overlay images and region crops.
pub(crate) fn debug_dir() -> PathBuf {
    if let Some(dir) = base_dir_override() {
        return dir.join(".cache/debug");
    }
    let suffix = format!("{}/.cache/debug", BASE_DIR_NAME);
    home_join(&suffix).unwrap_or_else(|| PathBuf::from(suffix))
}

fn base_dir_override() -> Option<PathBuf> {
    std::env::var(BASE_DIR_ENV)
        .ok()
        .and_then(|value| normalize_dir(&value))
}

fn home_join(suffix: &str) -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(suffix))
        }
    })
}

fn normalize_dir(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_tilde(trimmed);
    let mut normalized = PathBuf::new();
    for component in Path::new(&expanded).components() {
        normalized.push(component.as_os_str());
    }
    Some(normalized)
}

fn expand_tilde(value: &str) -> String {
    if value == "~" || value.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            let home = home.trim();
            if home.is_empty() {
                return value.to_string();
            }
            return format!("{}{}", home, &value[1..]);
        }
    }
    value.to_string()
}
