//! Packing and unpacking of gzip-compressed tar archives.

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};
use walkdir::WalkDir;

use crate::logger::Logger;
use crate::transfer::source_base_name;

fn spinner(show: bool, msg: &str) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb
}

/// Create a `.tar.gz` at `output` from the given inputs.
///
/// Without `recursive` every input must be a plain file, archived under its
/// base name. With `recursive` a single input is either a glob pattern
/// (dot-files included) or a directory walked depth-first, directories
/// before their children. Returns `(files, bytes)` packed.
pub fn pack(
    inputs: &[String],
    recursive: bool,
    output: &Path,
    show_progress: bool,
    logger: &dyn Logger,
) -> Result<(u64, u64)> {
    let file = File::create(output)
        .with_context(|| format!("Failed to create archive {}", output.display()))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = Builder::new(encoder);

    let pb = spinner(show_progress, "Packing...");
    let mut file_count = 0u64;
    let mut total_bytes = 0u64;

    let mut track = |path: &Path| {
        if let Ok(metadata) = path.metadata() {
            if metadata.is_file() {
                total_bytes += metadata.len();
                file_count += 1;
            }
        }
        logger.archived(path);
        pb.set_message(format!(
            "Packing {} files ({} MB)",
            file_count,
            total_bytes / 1_048_576
        ));
    };

    if recursive {
        let input = &inputs[0];
        if is_glob(input) {
            let prefix = static_prefix(input);
            for matched in glob::glob(input)
                .with_context(|| format!("Invalid pattern {input:?}"))?
            {
                let path = matched?;
                let rel = path.strip_prefix(&prefix).unwrap_or(&path).to_path_buf();
                if rel.as_os_str().is_empty() {
                    continue;
                }
                if path.is_dir() {
                    builder.append_dir(&rel, &path)?;
                } else {
                    builder.append_path_with_name(&path, &rel)?;
                }
                track(&path);
            }
        } else {
            let root = Path::new(input);
            let base = root.parent().unwrap_or_else(|| Path::new(""));
            for entry in WalkDir::new(root)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                let rel = path.strip_prefix(base).unwrap_or(path);
                if rel.as_os_str().is_empty() {
                    continue;
                }
                if entry.file_type().is_dir() {
                    builder.append_dir(rel, path)?;
                } else if entry.file_type().is_file() {
                    builder.append_path_with_name(path, rel)?;
                }
                track(path);
            }
        }
    } else {
        for input in inputs {
            let path = Path::new(input);
            if !path.is_file() {
                bail!("Input {input:?} is not a plain file; directories need -r");
            }
            builder.append_path_with_name(path, source_base_name(input))?;
            track(path);
        }
    }

    let encoder = builder.into_inner().context("Failed to finish archive")?;
    let mut writer = encoder.finish().context("Failed to finish gzip stream")?;
    writer.flush()?;

    pb.finish_with_message(format!(
        "Packed {} files ({} MB)",
        file_count,
        total_bytes / 1_048_576
    ));
    Ok((file_count, total_bytes))
}

/// Extract a `.tar.gz` into `output`, creating it if missing.
/// Returns the number of entries written.
pub fn unpack(
    input: &Path,
    output: &Path,
    show_progress: bool,
    logger: &dyn Logger,
) -> Result<u64> {
    let file = File::open(input)
        .with_context(|| format!("Failed to open archive {}", input.display()))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let pb = spinner(show_progress, "Extracting...");
    let mut count = 0u64;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_path_buf();
        // unpack_in refuses entries that would escape the destination
        if entry.unpack_in(output)? {
            logger.extracted(&path);
            count += 1;
            pb.set_message(format!("Extracting {count} entries"));
        }
    }
    pb.finish_with_message(format!("Extracted {count} entries"));
    Ok(count)
}

fn is_glob(input: &str) -> bool {
    input.chars().any(|c| matches!(c, '*' | '?' | '['))
}

/// Leading path components of a pattern that contain no glob metacharacters.
/// Archive paths for glob matches are taken relative to this prefix.
fn static_prefix(pattern: &str) -> PathBuf {
    let mut prefix = PathBuf::new();
    for component in Path::new(pattern).components() {
        if is_glob(&component.as_os_str().to_string_lossy()) {
            break;
        }
        prefix.push(component);
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NoopLogger;

    fn write_file(path: &Path, contents: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn entry_names(archive_path: &Path) -> Vec<String> {
        let file = File::open(archive_path).unwrap();
        let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_pack_then_unpack_directory_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("data");
        write_file(&root.join("top.txt"), b"top");
        write_file(&root.join("sub/leaf.txt"), b"leaf contents");

        let archive_path = tmp.path().join("data.tar.gz");
        let (files, bytes) = pack(
            &[root.to_string_lossy().into_owned()],
            true,
            &archive_path,
            false,
            &NoopLogger,
        )
        .unwrap();
        assert_eq!(files, 2);
        assert_eq!(bytes, 3 + 13);

        let out = tmp.path().join("out");
        let entries = unpack(&archive_path, &out, false, &NoopLogger).unwrap();
        assert!(entries >= 2);
        assert_eq!(fs::read(out.join("data/top.txt")).unwrap(), b"top");
        assert_eq!(
            fs::read(out.join("data/sub/leaf.txt")).unwrap(),
            b"leaf contents"
        );
    }

    #[test]
    fn test_non_recursive_pack_rejects_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("somedir");
        fs::create_dir(&dir).unwrap();

        let err = pack(
            &[dir.to_string_lossy().into_owned()],
            false,
            &tmp.path().join("out.tar.gz"),
            false,
            &NoopLogger,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not a plain file"));
    }

    #[test]
    fn test_directories_precede_children_in_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("data");
        write_file(&root.join("sub/leaf.txt"), b"x");

        let archive_path = tmp.path().join("data.tar.gz");
        pack(
            &[root.to_string_lossy().into_owned()],
            true,
            &archive_path,
            false,
            &NoopLogger,
        )
        .unwrap();

        let names = entry_names(&archive_path);
        let dir_pos = names
            .iter()
            .position(|n| n.trim_end_matches('/').ends_with("sub"))
            .expect("directory entry present");
        let leaf_pos = names
            .iter()
            .position(|n| n.ends_with("leaf.txt"))
            .expect("file entry present");
        assert!(dir_pos < leaf_pos);
    }

    #[test]
    fn test_pack_glob_pattern_selects_matching_files() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(&tmp.path().join("x1.txt"), b"1");
        write_file(&tmp.path().join("x2.txt"), b"2");
        write_file(&tmp.path().join("skip.bin"), b"3");

        let pattern = format!("{}/*.txt", tmp.path().display());
        let archive_path = tmp.path().join("texts.tar.gz");
        let (files, _) = pack(&[pattern], true, &archive_path, false, &NoopLogger).unwrap();
        assert_eq!(files, 2);

        let names = entry_names(&archive_path);
        assert!(names.iter().any(|n| n == "x1.txt"));
        assert!(names.iter().any(|n| n == "x2.txt"));
        assert!(!names.iter().any(|n| n.contains("skip.bin")));
    }

    #[test]
    fn test_static_prefix_stops_at_metacharacters() {
        assert_eq!(static_prefix("a/b/*.txt"), PathBuf::from("a/b"));
        assert_eq!(static_prefix("*.txt"), PathBuf::from(""));
        assert_eq!(static_prefix("a/b/c"), PathBuf::from("a/b/c"));
    }
}
