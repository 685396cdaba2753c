use std::path::Path;

use async_trait::async_trait;

/// Raw filesystem capacity figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    /// Bytes available to unprivileged users
    pub free_bytes: u64,
    pub total_bytes: u64,
}

impl DiskUsage {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageProbeError {
    #[error("Failed to stat filesystem at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Filesystem probe task failed: {0}")]
    Task(String),

    #[error("Filesystem probe not supported on this platform")]
    Unsupported,
}

/// Reads capacity of the filesystem holding a path.
#[async_trait]
pub trait DiskProbe: Send + Sync {
    async fn usage(&self, path: &Path) -> Result<DiskUsage, StorageProbeError>;
}

/// `statvfs(3)` on the blocking thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatvfsProbe;

#[async_trait]
impl DiskProbe for StatvfsProbe {
    async fn usage(&self, path: &Path) -> Result<DiskUsage, StorageProbeError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || statvfs(&path))
            .await
            .map_err(|e| StorageProbeError::Task(e.to_string()))?
    }
}

#[cfg(unix)]
fn statvfs(path: &Path) -> Result<DiskUsage, StorageProbeError> {
    use std::os::unix::ffi::OsStrExt;

    let io_err = |source: std::io::Error| StorageProbeError::Io {
        path: path.display().to_string(),
        source,
    };

    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io_err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

    let mut stat = std::mem::MaybeUninit::<libc::statvfs>::uninit();
    let result = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if result != 0 {
        return Err(io_err(std::io::Error::last_os_error()));
    }
    let stat = unsafe { stat.assume_init() };

    // Field widths differ between platforms.
    #[allow(clippy::unnecessary_cast)]
    let fragment = stat.f_frsize as u64;
    #[allow(clippy::unnecessary_cast)]
    let usage = DiskUsage {
        free_bytes: (stat.f_bavail as u64).saturating_mul(fragment),
        total_bytes: (stat.f_blocks as u64).saturating_mul(fragment),
    };
    Ok(usage)
}

#[cfg(not(unix))]
fn statvfs(_path: &Path) -> Result<DiskUsage, StorageProbeError> {
    Err(StorageProbeError::Unsupported)
}

/// Probe returning a settable reading, for tests.
#[cfg(test)]
#[derive(Debug)]
pub struct FixedProbe {
    reading: parking_lot::Mutex<Option<DiskUsage>>,
}

#[cfg(test)]
impl FixedProbe {
    pub fn new(free_bytes: u64, total_bytes: u64) -> Self {
        Self {
            reading: parking_lot::Mutex::new(Some(DiskUsage {
                free_bytes,
                total_bytes,
            })),
        }
    }

    /// A probe that always fails.
    pub fn failing() -> Self {
        Self {
            reading: parking_lot::Mutex::new(None),
        }
    }

    pub fn set(&self, free_bytes: u64, total_bytes: u64) {
        *self.reading.lock() = Some(DiskUsage {
            free_bytes,
            total_bytes,
        });
    }
}

#[cfg(test)]
#[async_trait]
impl DiskProbe for FixedProbe {
    async fn usage(&self, _path: &Path) -> Result<DiskUsage, StorageProbeError> {
        (*self.reading.lock()).ok_or(StorageProbeError::Unsupported)
    }
}
