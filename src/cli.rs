//! Command-line surface: argument definitions and per-subcommand validation.
//!
//! Validation happens here, before the transfer engine sees a request; the
//! engine assumes an already-validated batch.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::storage::Backend;
use crate::transfer::{source_base_name, FailureMode};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Small file-moving helper: parallel downloads, object-storage uploads, tar.gz pack/unpack"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Write timestamped log lines to a file
    #[arg(long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,

    /// Hide the progress display
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download files over HTTP(S)
    Download(DownloadArgs),
    /// Upload files to an object-storage bucket
    Upload(UploadArgs),
    /// Pack files or a directory tree into a .tar.gz archive
    Pack(PackArgs),
    /// Extract a .tar.gz archive
    Unpack(UnpackArgs),
}

#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    /// Source URL (repeat for multiple files)
    #[arg(short = 'i', long = "input", required = true)]
    pub inputs: Vec<String>,

    /// Output file path (single input only; takes precedence over -d)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Directory to download into, named after each URL
    #[arg(short = 'd', long = "directory")]
    pub directory: Option<PathBuf>,

    /// Per-file timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// On failure: remove partial output and keep going
    #[arg(long)]
    pub safe: bool,
}

impl DownloadArgs {
    pub fn validate(&self) -> Result<()> {
        if self.output.is_none() && self.directory.is_none() {
            bail!("either -o/--output or -d/--directory is required");
        }
        if self.inputs.len() > 1 && self.output.is_some() {
            bail!("multiple inputs cannot share one -o/--output, use -d/--directory");
        }
        if let Some(dir) = &self.directory {
            if !dir.is_dir() {
                bail!(
                    "download directory {} does not exist or is not a directory",
                    dir.display()
                );
            }
        }
        Ok(())
    }

    pub fn failure_mode(&self) -> FailureMode {
        failure_mode(self.safe)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// `(url, local destination)` pairs for the batch.
    pub fn pairs(&self) -> Vec<(String, PathBuf)> {
        self.inputs
            .iter()
            .map(|url| {
                let dest = match (&self.output, &self.directory) {
                    (Some(output), _) => output.clone(),
                    (None, Some(dir)) => dir.join(source_base_name(url)),
                    (None, None) => PathBuf::from(source_base_name(url)),
                };
                (url.clone(), dest)
            })
            .collect()
    }
}

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    /// Local file to upload (repeat for multiple files)
    #[arg(short = 'i', long = "input", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Remote key prefix for uploaded objects
    #[arg(short = 'o', long = "output")]
    pub output: String,

    /// JSON config file for the storage backend
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,

    /// Storage backend
    #[arg(short = 't', long = "type", value_enum, default_value = "ali")]
    pub backend: Backend,

    /// Per-file timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// On failure: abandon the unit's upload and keep going
    #[arg(long)]
    pub safe: bool,
}

impl UploadArgs {
    pub fn validate(&self) -> Result<()> {
        if !self.config.is_file() {
            bail!("config file {} does not exist", self.config.display());
        }
        for input in &self.inputs {
            if !input.is_file() {
                bail!("input {} does not exist or is not a file", input.display());
            }
        }
        Ok(())
    }

    pub fn failure_mode(&self) -> FailureMode {
        failure_mode(self.safe)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// `(local path, remote key)` pairs; keys live under the output prefix.
    pub fn pairs(&self) -> Vec<(String, PathBuf)> {
        let prefix = self.output.trim_matches('/');
        self.inputs
            .iter()
            .map(|path| {
                let source = path.to_string_lossy().into_owned();
                let name = source_base_name(&source).to_string();
                let key = if prefix.is_empty() {
                    PathBuf::from(&name)
                } else {
                    PathBuf::from(prefix).join(&name)
                };
                (source, key)
            })
            .collect()
    }
}

#[derive(clap::Args, Debug)]
pub struct PackArgs {
    /// File to pack, or with -r a directory or glob pattern
    #[arg(short = 'i', long = "input", required = true)]
    pub inputs: Vec<String>,

    /// Archive path to create
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Recurse into a directory or expand a glob pattern (single input only)
    #[arg(short = 'r', long)]
    pub recursive: bool,
}

impl PackArgs {
    pub fn validate(&self) -> Result<()> {
        if self.recursive && self.inputs.len() > 1 {
            bail!("-r supports a single input");
        }
        if !self.recursive {
            for input in &self.inputs {
                if !PathBuf::from(input).is_file() {
                    bail!("input {input:?} is not a plain file; directories need -r");
                }
            }
        }
        Ok(())
    }
}

#[derive(clap::Args, Debug)]
pub struct UnpackArgs {
    /// Archive to extract
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Directory to extract into (created if missing)
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
}

impl UnpackArgs {
    pub fn validate(&self) -> Result<()> {
        if !self.input.is_file() {
            bail!("archive {} does not exist", self.input.display());
        }
        Ok(())
    }
}

fn failure_mode(safe: bool) -> FailureMode {
    if safe {
        FailureMode::ContinueAndCleanup
    } else {
        FailureMode::Abort
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn download(inputs: &[&str], output: Option<&str>, directory: Option<&str>) -> DownloadArgs {
        DownloadArgs {
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            output: output.map(PathBuf::from),
            directory: directory.map(PathBuf::from),
            timeout: None,
            safe: false,
        }
    }

    #[test]
    fn test_download_requires_a_sink() {
        let err = download(&["https://e.com/a"], None, None).validate().unwrap_err();
        assert!(err.to_string().contains("-o/--output or -d/--directory"));
    }

    #[test]
    fn test_multiple_inputs_reject_single_output() {
        let args = download(&["https://e.com/a", "https://e.com/b"], Some("out.bin"), None);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_download_directory_must_exist() {
        let args = download(&["https://e.com/a"], None, Some("/definitely/not/here"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_download_destinations_derive_from_url() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_string_lossy().into_owned();
        let args = download(&["https://e.com/files/a.txt?sig=x"], None, Some(&dir));
        args.validate().unwrap();

        let pairs = args.pairs();
        assert_eq!(pairs[0].1, tmp.path().join("a.txt"));
    }

    #[test]
    fn test_safe_flag_selects_continue_mode() {
        let mut args = download(&["u"], Some("o"), None);
        assert_eq!(args.failure_mode(), FailureMode::Abort);
        args.safe = true;
        assert_eq!(args.failure_mode(), FailureMode::ContinueAndCleanup);
    }

    #[test]
    fn test_upload_keys_join_prefix_and_name() {
        let args = UploadArgs {
            inputs: vec![PathBuf::from("/tmp/build/app.tar.gz")],
            output: "releases/v1/".to_string(),
            config: PathBuf::from("oss.json"),
            backend: Backend::AliyunOss,
            timeout: None,
            safe: false,
        };
        let pairs = args.pairs();
        assert_eq!(pairs[0].1, PathBuf::from("releases/v1/app.tar.gz"));
    }

    #[test]
    fn test_recursive_pack_takes_single_input() {
        let args = PackArgs {
            inputs: vec!["a".into(), "b".into()],
            output: PathBuf::from("out.tar.gz"),
            recursive: true,
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_flag_grammar_parses() {
        let args = Args::try_parse_from([
            "ferry", "download", "-i", "https://e.com/a.txt", "-d", ".", "--timeout", "30",
            "--safe",
        ])
        .unwrap();
        match args.command {
            Command::Download(cmd) => {
                assert_eq!(cmd.inputs.len(), 1);
                assert_eq!(cmd.timeout, Some(30));
                assert!(cmd.safe);
            }
            _ => panic!("expected download subcommand"),
        }
    }
}
