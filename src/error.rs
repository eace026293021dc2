/// Error kinds surfaced by the public API.
///
/// Every kind is a bare tag; the failing operation and path are known to the
/// caller already.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Unexpected I/O failure, bad image, or wrong type without a dedicated kind
    General,
    /// Parent missing, target already exists, or allocator exhausted during create
    Create,
    NoSuchFile,
    NoSuchDir,
    /// Open-twice, or unlink of an open file
    FileInUse,
    /// Write would exceed `MAX_SECTORS_PER_FILE * SECTOR_SIZE`
    FileTooBig,
    /// Sector bitmap exhausted
    NoSpace,
    TooManyOpenFiles,
    /// Invalid or closed descriptor
    BadFd,
    /// Seek past EOF or negative
    SeekOutOfBounds,
    DirNotEmpty,
    /// Attempt to unlink the root directory
    RootDir,
    /// `read_dir` buffer shorter than the directory contents
    BufferTooSmall,
}

impl From<std::io::Error> for FsError {
    fn from(_value: std::io::Error) -> Self {
        Self::General
    }
}

impl FsError {
    pub fn as_str(&self) -> &'static str {
        match self {
            FsError::General => "general failure",
            FsError::Create => "cannot create",
            FsError::NoSuchFile => "no such file",
            FsError::NoSuchDir => "no such directory",
            FsError::FileInUse => "file is in use",
            FsError::FileTooBig => "file too big",
            FsError::NoSpace => "no space left on disk",
            FsError::TooManyOpenFiles => "too many open files",
            FsError::BadFd => "bad file descriptor",
            FsError::SeekOutOfBounds => "seek out of bounds",
            FsError::DirNotEmpty => "directory not empty",
            FsError::RootDir => "cannot unlink root directory",
            FsError::BufferTooSmall => "buffer too small",
        }
    }
}

impl core::fmt::Display for FsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for FsError {}
