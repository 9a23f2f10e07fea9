use std::path::{Path, PathBuf};

use walkdir::WalkDir;

pub fn is_yaml_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// All YAML files below `root`, skipping `.git` directories entirely.
pub fn find_yaml_files(root: &Path) -> Result<Vec<PathBuf>, anyhow::Error> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && entry.file_name() == ".git"));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() && is_yaml_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Files in `dir` whose names end with `suffix`, as (name without suffix, file name) pairs sorted by name.
pub fn files_with_suffix(dir: &Path, suffix: &str) -> std::io::Result<Vec<(String, String)>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        if let Some(stem) = file_name.strip_suffix(suffix) {
            if !stem.is_empty() {
                found.push((stem.to_string(), file_name.clone()));
            }
        }
    }
    found.sort();
    Ok(found)
}
