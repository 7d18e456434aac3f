//! Guarded file reads for `<ReadFile>`.
//!
//! Only regular text files under a size limit are returned. Text detection
//! is an extension allow-list, then known extensionless names, then a
//! null-byte check of the first 512 bytes for files without an extension.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

const SNIFF_BYTES: usize = 512;

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "go", "py", "js", "ts", "html", "css", "json", "xml", "yaml", "yml", "sh", "bash",
    "zsh", "fish", "ps1", "bat", "cmd", "c", "cpp", "h", "hpp", "java", "php", "rb", "rs", "swift",
    "kt", "scala", "clj", "hs", "ml", "fs", "sql", "r", "m", "pl", "lua", "vim", "emacs", "cfg",
    "conf", "ini", "toml", "dockerfile", "makefile", "cmake", "gradle", "properties", "log", "csv",
    "tsv", "lock",
];

const TEXT_FILE_NAMES: &[&str] = &[
    "readme",
    "license",
    "changelog",
    "makefile",
    "dockerfile",
    "gemfile",
    "rakefile",
    "procfile",
    "vagrantfile",
    "gruntfile",
    "gulpfile",
    "webpack",
    "package",
    "composer",
];

#[derive(Debug, Error)]
pub enum ReadFileError {
    #[error("file does not exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("path is a directory, not a file: {}", .0.display())]
    IsDirectory(PathBuf),
    #[error("file too large ({size} bytes, max {max} bytes): {}", .path.display())]
    TooLarge { path: PathBuf, size: u64, max: u64 },
    #[error("file appears to be binary: {}", .0.display())]
    Binary(PathBuf),
    #[error("file reading cancelled by user")]
    Cancelled,
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A file that passed every check and is about to be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCandidate {
    pub path: PathBuf,
    pub size: u64,
}

/// Resolve `raw` against `cwd` and run every check short of reading.
pub fn inspect(raw: &str, cwd: &Path, max_size: u64) -> Result<ReadCandidate, ReadFileError> {
    let raw = raw.trim();
    let path = if Path::new(raw).is_absolute() {
        PathBuf::from(raw)
    } else {
        cwd.join(raw)
    };

    let metadata = match fs::metadata(&path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(ReadFileError::NotFound(path));
        }
        Err(source) => return Err(ReadFileError::Io { path, source }),
    };
    if metadata.is_dir() {
        return Err(ReadFileError::IsDirectory(path));
    }
    if metadata.len() > max_size {
        return Err(ReadFileError::TooLarge {
            size: metadata.len(),
            max: max_size,
            path,
        });
    }
    if !is_text_file(&path) {
        return Err(ReadFileError::Binary(path));
    }
    Ok(ReadCandidate {
        path,
        size: metadata.len(),
    })
}

/// Read a file that passed [`inspect`].
pub fn read(candidate: &ReadCandidate) -> Result<String, ReadFileError> {
    let bytes = fs::read(&candidate.path).map_err(|source| ReadFileError::Io {
        path: candidate.path.clone(),
        source,
    })?;
    info!(path = %candidate.path.display(), bytes = bytes.len(), "read file");
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn is_text_file(path: &Path) -> bool {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase());
    if let Some(ext) = &extension
        && TEXT_EXTENSIONS.contains(&ext.as_str())
    {
        return true;
    }

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if TEXT_FILE_NAMES.contains(&name.as_str()) {
        return true;
    }

    if extension.is_none() {
        return sniff_is_text(path);
    }
    false
}

fn sniff_is_text(path: &Path) -> bool {
    let mut buf = [0u8; SNIFF_BYTES];
    let read = File::open(path).and_then(|mut file| file.read(&mut buf));
    match read {
        Ok(n) => !buf[..n].contains(&0),
        Err(err) => {
            debug!(err = %err, path = %path.display(), "text check failed");
            false
        }
    }
}
