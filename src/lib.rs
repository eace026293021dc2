//! An educational file system kept inside a single fixed-size image file
//! that stands in for a sector-addressed block device.
//!
//! The disk is partitioned into a superblock, two allocation bitmaps, an
//! inode table, and data blocks (see [`layout`]). [`fs::FileSystem`] mounts
//! an image (formatting a fresh one on first boot) and exposes a
//! POSIX-flavored API: create/open/read/write/seek/close/unlink for files
//! and create/read/size/unlink for directories.

#[cfg(target_endian = "big")]
compile_error!("on-disk integers are little-endian; big-endian hosts are not supported");

pub mod bitmap;
pub mod dir;
pub mod disk;
pub mod error;
pub mod file;
pub mod fs;
pub mod inode;
pub mod layout;
pub mod param;
pub mod path;
pub mod policy;

pub use error::FsError;
pub use fs::{FileSystem, Usage};
