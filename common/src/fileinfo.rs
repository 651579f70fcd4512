/// Entry classification reported by `info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
    Symlink,
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FileKind::File => "file",
            FileKind::Directory => "directory",
            FileKind::Symlink => "symlink",
        })
    }
}

/// Metadata shape every backend reduces its native stat result to.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileInfo {
    pub kind: FileKind,
    pub size: u64,
    /// Absent when the backend does not report modification times.
    pub modified: Option<std::time::SystemTime>,
}

impl FileInfo {
    pub fn file(size: u64) -> Self {
        Self {
            kind: FileKind::File,
            size,
            modified: None,
        }
    }

    pub fn directory() -> Self {
        Self {
            kind: FileKind::Directory,
            size: 0,
            modified: None,
        }
    }

    pub fn with_modified(mut self, modified: std::time::SystemTime) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

impl From<&std::fs::Metadata> for FileInfo {
    fn from(metadata: &std::fs::Metadata) -> Self {
        let kind = if metadata.is_dir() {
            FileKind::Directory
        } else if metadata.is_symlink() {
            FileKind::Symlink
        } else {
            FileKind::File
        };
        Self {
            kind,
            size: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }
}

impl std::fmt::Display for FileInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, bytesize::ByteSize(self.size))?;
        if let Some(modified) = self.modified
            && let Ok(elapsed) = modified.elapsed()
        {
            write!(f, " (modified {} ago)", humanized(elapsed))?;
        }
        Ok(())
    }
}

fn humanized(elapsed: std::time::Duration) -> String {
    // coarse rendering for the stat output, full precision stays in --json
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}
