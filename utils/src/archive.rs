use std::io::Read;
use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Context};
use flate2::read::GzDecoder;
use tar::Archive;

/// Unpacks a `.tar.gz` into `dest`. Entries that would land outside `dest` are rejected.
pub fn extract_targz(targz: &[u8], dest: &Path) -> Result<(), anyhow::Error> {
    let decoder = GzDecoder::new(targz);
    let mut archive = Archive::new(decoder);

    for entry in archive.entries().context("Failed to read tar entries")? {
        let mut entry = entry.context("Failed to access tar entry")?;
        let path = entry.path()?.into_owned();
        let outpath = safe_join(dest, &path)?;

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            std::fs::create_dir_all(&outpath)?;
        } else if entry_type.is_file() {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            std::fs::write(&outpath, data)?;
        }
        // Links and metadata entries (pax headers) are skipped
    }
    Ok(())
}

fn safe_join(dest: &Path, entry: &Path) -> Result<PathBuf, anyhow::Error> {
    let mut out = dest.to_path_buf();
    for component in entry.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => {
                return Err(anyhow!(
                    "Archive entry escapes extraction directory: {}",
                    entry.display()
                ))
            }
        }
    }
    Ok(out)
}

/// The single top-level directory of an extracted archive, as produced by GitHub tarballs.
pub fn single_top_level_dir(dir: &Path) -> Result<PathBuf, anyhow::Error> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    match dirs.len() {
        1 => Ok(dirs.remove(0)),
        n => Err(anyhow!(
            "Expected one top-level directory in archive, found {}",
            n
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn build_targz(files: &[(&str, &str)]) -> Vec<u8> {
        let mut tar_buf = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_buf);
            for (path, content) in files {
                let mut header = tar::Header::new_gnu();
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder
                    .append_data(&mut header, path, content.as_bytes())
                    .unwrap();
            }
            builder.finish().unwrap();
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_buf).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_extract_targz() {
        let targz = build_targz(&[
            ("acme-platform-abc123/charts/my-app/Chart.yaml", "name: my-app\n"),
            ("acme-platform-abc123/README.md", "hello"),
        ]);
        let tmp = tempfile::tempdir().unwrap();
        extract_targz(&targz, tmp.path()).unwrap();

        let top = single_top_level_dir(tmp.path()).unwrap();
        assert_eq!(top, tmp.path().join("acme-platform-abc123"));
        let chart = std::fs::read_to_string(top.join("charts/my-app/Chart.yaml")).unwrap();
        assert_eq!(chart, "name: my-app\n");
    }

    #[test]
    fn test_safe_join_rejects_parent_dir() {
        let dest = Path::new("/tmp/out");
        assert!(safe_join(dest, Path::new("../etc/passwd")).is_err());
        assert!(safe_join(dest, Path::new("/etc/passwd")).is_err());
        assert_eq!(
            safe_join(dest, Path::new("./a/b.yaml")).unwrap(),
            PathBuf::from("/tmp/out/a/b.yaml")
        );
    }

    #[test]
    fn test_single_top_level_dir_requires_exactly_one() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("a")).unwrap();
        std::fs::create_dir(tmp.path().join("b")).unwrap();
        assert!(single_top_level_dir(tmp.path()).is_err());
    }
}
