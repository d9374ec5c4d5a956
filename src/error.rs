use std::io;
use std::num::ParseIntError;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("cannot open map file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read map file")]
    Read(#[from] io::Error),
    #[error("line {line}: invalid hex number {text:?}")]
    InvalidNumber {
        line: usize,
        text: String,
        #[source]
        source: ParseIntError,
    },
    #[error("line {line}: size of {files} no longer fits in 64 bits")]
    SizeOverflow { line: usize, files: String },
    #[error("line {line}: module contribution before any allocated section")]
    OrphanModule { line: usize },
    #[error("unknown memory usage provider {name:?} (known: {known})")]
    UnknownProvider { name: String, known: String },
    #[error("linker for target {target:?} in mode {build_mode:?} cannot produce a map file")]
    Unsupported { target: String, build_mode: String },
}

pub type MapResult<T> = Result<T, MapError>;
