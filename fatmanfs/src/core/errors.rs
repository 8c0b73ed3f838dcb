// SPDX-License-Identifier: MIT

use core::fmt;

pub use fatmanio::errors::*;

/// Coarse classification of every engine failure.
///
/// Callers (the command surface) map each kind to its own exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsErrorKind {
    /// Bad or unsupported boot record / free-space record geometry.
    VolumeFormat,
    /// Cluster number outside the table, or a broken chain.
    ClusterRange,
    PathNotFound,
    PathConflict,
    InsufficientSpace,
    /// Directory record stream that cannot be decoded.
    CorruptDirectory,
    Io,
    Internal,
}

impl FsErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            FsErrorKind::VolumeFormat => "volume format error",
            FsErrorKind::ClusterRange => "cluster range error",
            FsErrorKind::PathNotFound => "path not found",
            FsErrorKind::PathConflict => "path conflict",
            FsErrorKind::InsufficientSpace => "insufficient space",
            FsErrorKind::CorruptDirectory => "corrupt directory",
            FsErrorKind::Io => "I/O error",
            FsErrorKind::Internal => "internal error",
        }
    }
}

impl fmt::Display for FsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsVolumeError {
    IO(BlockIOError),
    BadBootSignature,
    BadFsInfoSignature,
    InvalidGeometry(&'static str),
    Unsupported(&'static str),
    ImageTooSmall { needed: u64, actual: u64 },
    Other(&'static str),
}

impl FsVolumeError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsVolumeError::IO(_) => "IO error",
            FsVolumeError::BadBootSignature => "Boot record signature is not 0x55AA",
            FsVolumeError::BadFsInfoSignature => "FSInfo signatures are invalid",
            FsVolumeError::InvalidGeometry(msg) => msg,
            FsVolumeError::Unsupported(msg) => msg,
            FsVolumeError::ImageTooSmall { .. } => "Image is smaller than the declared volume",
            FsVolumeError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsVolumeError::IO(e) => Some(FsError::IO(*e)),
            _ => None,
        }
    }

    pub fn kind(&self) -> FsErrorKind {
        match self {
            FsVolumeError::IO(_) => FsErrorKind::Io,
            FsVolumeError::Other(_) => FsErrorKind::Internal,
            _ => FsErrorKind::VolumeFormat,
        }
    }
}

impl fmt::Display for FsVolumeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        if let FsVolumeError::ImageTooSmall { needed, actual } = self {
            write!(f, " (needs {needed} bytes, has {actual})")?;
        }
        write_chain(f, self.source())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsChainError {
    IO(BlockIOError),
    OutOfRange(u32),
    NotFree(u32),
    NotEndOfChain(u32),
    BrokenChain(u32),
    LoopDetected(u32),
    /// Chain starting at this cluster ends before the recorded size.
    TooShort(u32),
    Other(&'static str),
}

impl FsChainError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsChainError::IO(_) => "IO error",
            FsChainError::OutOfRange(_) => "Cluster number outside the cluster table",
            FsChainError::NotFree(_) => "FAT entry is already in use",
            FsChainError::NotEndOfChain(_) => "FAT entry is not an end-of-chain marker",
            FsChainError::BrokenChain(_) => "Cluster chain links to a free cluster",
            FsChainError::LoopDetected(_) => "Loop detected in cluster chain",
            FsChainError::TooShort(_) => "Cluster chain ends before the recorded file size",
            FsChainError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsChainError::IO(e) => Some(FsError::IO(*e)),
            _ => None,
        }
    }

    pub fn kind(&self) -> FsErrorKind {
        match self {
            FsChainError::IO(_) => FsErrorKind::Io,
            FsChainError::Other(_) => FsErrorKind::Internal,
            _ => FsErrorKind::ClusterRange,
        }
    }

    pub fn cluster(&self) -> Option<u32> {
        match self {
            FsChainError::OutOfRange(c)
            | FsChainError::NotFree(c)
            | FsChainError::NotEndOfChain(c)
            | FsChainError::BrokenChain(c)
            | FsChainError::LoopDetected(c)
            | FsChainError::TooShort(c) => Some(*c),
            _ => None,
        }
    }
}

impl fmt::Display for FsChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        if let Some(cluster) = self.cluster() {
            write!(f, " (cluster: {cluster})")?;
        }
        write_chain(f, self.source())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsAllocatorError {
    IO(BlockIOError),
    Chain(FsChainError),
    InsufficientSpace { needed: u32, available: u32 },
    FileTooLarge,
    Other(&'static str),
}

impl FsAllocatorError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsAllocatorError::IO(_) => "IO error",
            FsAllocatorError::Chain(_) => "Cluster chain error",
            FsAllocatorError::InsufficientSpace { .. } => "Not enough free clusters",
            FsAllocatorError::FileTooLarge => "File exceeds the 4 GiB FAT32 limit",
            FsAllocatorError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsAllocatorError::IO(e) => Some(FsError::IO(*e)),
            FsAllocatorError::Chain(e) => Some(FsError::Chain(*e)),
            _ => None,
        }
    }

    pub fn kind(&self) -> FsErrorKind {
        match self {
            FsAllocatorError::IO(_) => FsErrorKind::Io,
            FsAllocatorError::Chain(e) => e.kind(),
            FsAllocatorError::Other(_) => FsErrorKind::Internal,
            _ => FsErrorKind::InsufficientSpace,
        }
    }
}

impl fmt::Display for FsAllocatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        if let FsAllocatorError::InsufficientSpace { needed, available } = self {
            write!(f, " (needed: {needed}, available: {available})")?;
        }
        write_chain(f, self.source())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsParsingError {
    IO(BlockIOError),
    Chain(FsChainError),
    /// Long-name records reached the end of the stream without a short record.
    UnterminatedLongName(u64),
    DirectoryCycle(u32),
    Invalid(&'static str),
    Other(&'static str),
}

impl FsParsingError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsParsingError::IO(_) => "IO error",
            FsParsingError::Chain(_) => "Cluster chain error",
            FsParsingError::UnterminatedLongName(_) => {
                "Long-name sequence is not followed by a short record"
            }
            FsParsingError::DirectoryCycle(_) => "Directory is reachable twice",
            FsParsingError::Invalid(msg) => msg,
            FsParsingError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsParsingError::IO(e) => Some(FsError::IO(*e)),
            FsParsingError::Chain(e) => Some(FsError::Chain(*e)),
            _ => None,
        }
    }

    pub fn kind(&self) -> FsErrorKind {
        match self {
            FsParsingError::IO(_) => FsErrorKind::Io,
            FsParsingError::Chain(e) => e.kind(),
            FsParsingError::Other(_) => FsErrorKind::Internal,
            _ => FsErrorKind::CorruptDirectory,
        }
    }
}

impl fmt::Display for FsParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        match self {
            FsParsingError::UnterminatedLongName(off) => write!(f, " (at byte {off:#x})")?,
            FsParsingError::DirectoryCycle(c) => write!(f, " (cluster: {c})")?,
            _ => {}
        }
        write_chain(f, self.source())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsResolverError {
    NotFound,
    /// A component resolved, but to a file where a directory was required (or the reverse).
    WrongKind,
    AlreadyExists,
    InvalidName(&'static str),
    RootNotAllowed,
    Other(&'static str),
}

impl FsResolverError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsResolverError::NotFound => "Path not found",
            FsResolverError::WrongKind => "Path does not name an entry of the expected type",
            FsResolverError::AlreadyExists => "Destination already exists",
            FsResolverError::InvalidName(msg) => msg,
            FsResolverError::RootNotAllowed => "Operation not allowed on the root directory",
            FsResolverError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        None
    }

    pub fn kind(&self) -> FsErrorKind {
        match self {
            FsResolverError::NotFound | FsResolverError::WrongKind => FsErrorKind::PathNotFound,
            FsResolverError::Other(_) => FsErrorKind::Internal,
            // A name the volume cannot hold is a destination that cannot be
            // created, the same outcome as one that already exists.
            FsResolverError::AlreadyExists
            | FsResolverError::InvalidName(_)
            | FsResolverError::RootNotAllowed => FsErrorKind::PathConflict,
        }
    }
}

impl fmt::Display for FsResolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsFormatterError {
    IO(BlockIOError),
    Invalid(&'static str),
    Other(&'static str),
}

impl FsFormatterError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsFormatterError::IO(_) => "IO error",
            FsFormatterError::Invalid(msg) => msg,
            FsFormatterError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsFormatterError::IO(e) => Some(FsError::IO(*e)),
            _ => None,
        }
    }

    pub fn kind(&self) -> FsErrorKind {
        match self {
            FsFormatterError::IO(_) => FsErrorKind::Io,
            FsFormatterError::Invalid(_) => FsErrorKind::VolumeFormat,
            FsFormatterError::Other(_) => FsErrorKind::Internal,
        }
    }
}

impl fmt::Display for FsFormatterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        write_chain(f, self.source())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsCheckerError {
    IO(BlockIOError),
    Chain(FsChainError),
    Parsing(FsParsingError),
    Other(&'static str),
}

impl FsCheckerError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsCheckerError::IO(_) => "IO error",
            FsCheckerError::Chain(_) => "Cluster chain error",
            FsCheckerError::Parsing(_) => "Parsing error",
            FsCheckerError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsCheckerError::IO(e) => Some(FsError::IO(*e)),
            FsCheckerError::Chain(e) => Some(FsError::Chain(*e)),
            FsCheckerError::Parsing(e) => Some(FsError::Parsing(*e)),
            _ => None,
        }
    }

    pub fn kind(&self) -> FsErrorKind {
        match self {
            FsCheckerError::IO(_) => FsErrorKind::Io,
            FsCheckerError::Chain(e) => e.kind(),
            FsCheckerError::Parsing(e) => e.kind(),
            FsCheckerError::Other(_) => FsErrorKind::Internal,
        }
    }
}

impl fmt::Display for FsCheckerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        write_chain(f, self.source())
    }
}

/// Top-level error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    IO(BlockIOError),
    Volume(FsVolumeError),
    Chain(FsChainError),
    Allocator(FsAllocatorError),
    Parsing(FsParsingError),
    Resolver(FsResolverError),
    Formatter(FsFormatterError),
    Checker(FsCheckerError),
    Other(&'static str),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::IO(e) => write!(f, "{e}"),
            FsError::Volume(e) => write!(f, "{e}"),
            FsError::Chain(e) => write!(f, "{e}"),
            FsError::Allocator(e) => write!(f, "{e}"),
            FsError::Parsing(e) => write!(f, "{e}"),
            FsError::Resolver(e) => write!(f, "{e}"),
            FsError::Formatter(e) => write!(f, "{e}"),
            FsError::Checker(e) => write!(f, "{e}"),
            FsError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl FsError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsError::IO(e) => e.msg(),
            FsError::Volume(e) => e.msg(),
            FsError::Chain(e) => e.msg(),
            FsError::Allocator(e) => e.msg(),
            FsError::Parsing(e) => e.msg(),
            FsError::Resolver(e) => e.msg(),
            FsError::Formatter(e) => e.msg(),
            FsError::Checker(e) => e.msg(),
            FsError::Other(msg) => msg,
        }
    }

    pub fn source(&self) -> Option<FsError> {
        match self {
            FsError::Volume(e) => e.source(),
            FsError::Chain(e) => e.source(),
            FsError::Allocator(e) => e.source(),
            FsError::Parsing(e) => e.source(),
            FsError::Resolver(e) => e.source(),
            FsError::Formatter(e) => e.source(),
            FsError::Checker(e) => e.source(),
            FsError::IO(_) => None,
            FsError::Other(_) => None,
        }
    }

    pub fn kind(&self) -> FsErrorKind {
        match self {
            FsError::IO(_) => FsErrorKind::Io,
            FsError::Volume(e) => e.kind(),
            FsError::Chain(e) => e.kind(),
            FsError::Allocator(e) => e.kind(),
            FsError::Parsing(e) => e.kind(),
            FsError::Resolver(e) => e.kind(),
            FsError::Formatter(e) => e.kind(),
            FsError::Checker(e) => e.kind(),
            FsError::Other(_) => FsErrorKind::Internal,
        }
    }
}

impl std::error::Error for FsError {}

fn write_chain(f: &mut fmt::Formatter<'_>, mut current: Option<FsError>) -> fmt::Result {
    while let Some(src) = current {
        write!(f, "\n  caused by: {}", src.msg())?;
        current = src.source();
    }
    Ok(())
}

// === type Fs*Result ===

pub type FsResult<T = ()> = Result<T, FsError>;
pub type FsVolumeResult<T = ()> = Result<T, FsVolumeError>;
pub type FsChainResult<T = ()> = Result<T, FsChainError>;
pub type FsAllocatorResult<T = ()> = Result<T, FsAllocatorError>;
pub type FsParsingResult<T = ()> = Result<T, FsParsingError>;
pub type FsResolverResult<T = ()> = Result<T, FsResolverError>;
pub type FsFormatterResult<T = ()> = Result<T, FsFormatterError>;
pub type FsCheckerResult<T = ()> = Result<T, FsCheckerError>;

crate::fs_error_wiring! {
    top => FsError {
        BlockIOError     : IO,
        FsVolumeError    : Volume,
        FsChainError     : Chain,
        FsAllocatorError : Allocator,
        FsParsingError   : Parsing,
        FsResolverError  : Resolver,
        FsFormatterError : Formatter,
        FsCheckerError   : Checker,
    },
    str_into => [
        FsVolumeError,
        FsChainError,
        FsAllocatorError,
        FsParsingError,
        FsResolverError,
        FsFormatterError,
        FsCheckerError,
    ],
    sub => {
        BlockIOError   => [ FsVolumeError::IO, FsChainError::IO, FsAllocatorError::IO, FsParsingError::IO, FsFormatterError::IO, FsCheckerError::IO ],
        FsChainError   => [ FsAllocatorError::Chain, FsParsingError::Chain, FsCheckerError::Chain ],
        FsParsingError => [ FsCheckerError::Parsing ],
    },
}
