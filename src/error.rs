use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not a recognized pack file")]
    UnknownPackKind,

    #[error("read of {len} bytes at offset {offset} is out of bounds (buffer is {available} bytes)")]
    OutOfBounds {
        offset: usize,
        len: usize,
        available: usize,
    },

    #[error("file range {offset}+{size} exceeds pack size {pack_size}")]
    BadFileRange { offset: u64, size: u64, pack_size: u64 },

    #[error("node is a folder, not a file")]
    NotAFile,

    #[error("unrecognized texture container")]
    UnknownTextureFormat,

    #[error("texture dimensions {width}x{height} out of range")]
    BadDimensions { width: u32, height: u32 },

    #[error("decoded pixel data too small: expected at least {expected} bytes, got {actual}")]
    ShortPixelData { expected: usize, actual: usize },

    #[error("invalid LZ4 block envelope: {0}")]
    BadLz4Envelope(&'static str),

    #[error("no key rotation decrypts this table")]
    TableKeyNotFound,

    #[error("invalid table structure: {0}")]
    BadTable(&'static str),

    #[error("invalid skeleton container: {0}")]
    BadSkeleton(&'static str),

    #[error(transparent)]
    Png(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}
