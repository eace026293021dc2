use std::io;

use log::debug;

use crate::dir;
use crate::disk::Disk;
use crate::inode::InodeSector;
use crate::param::MAX_NAME;

/// Inode number of the root directory
pub const ROOT_INODE: usize = 0;

/// Returns whether `name` can be stored in a dirent: 1 to `MAX_NAME - 1`
/// bytes, each drawn from `[A-Za-z0-9._-]`. Case-sensitive; `/` is never
/// part of a name.
pub fn is_legal_name(name: &str) -> bool {
    if name.is_empty() || name.len() >= MAX_NAME {
        return false;
    }
    name.bytes()
        .all(|c| c.is_ascii_alphanumeric() || c == b'.' || c == b'_' || c == b'-')
}

/// Outcome of following an absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Walk {
    /// The literal root directory `/`
    Root,
    /// Every component resolved
    Found { parent: usize, inode: usize },
    /// All intermediate directories exist but the final component does not
    Missing { parent: usize, name: String },
}

/// A path that cannot be followed at all: not absolute, an illegal
/// component, a missing or non-directory intermediate, or an I/O failure
/// underneath. Callers translate this into their own error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadPath;

impl From<io::Error> for BadPath {
    fn from(_value: io::Error) -> Self {
        Self
    }
}

/// Follows `path` from the root, one component at a time.
///
/// Empty components (repeated `/`) are skipped. A single table sector is
/// cached across the descent so children packed into the same inode sector
/// share a read.
pub fn walk(disk: &Disk, path: &str) -> Result<Walk, BadPath> {
    if !path.starts_with('/') {
        debug!("walk: '{path}' is not an absolute path");
        return Err(BadPath);
    }

    let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
    if components.peek().is_none() {
        return Ok(Walk::Root);
    }

    let mut table = InodeSector::load(disk, ROOT_INODE)?;
    let mut current = ROOT_INODE;

    while let Some(name) = components.next() {
        let leaf = components.peek().is_none();

        if !is_legal_name(name) {
            debug!("walk: illegal name '{name}'");
            return Err(BadPath);
        }

        let inode = table.get(current);
        if !inode.is_dir() {
            debug!("walk: inode {current} is not a directory");
            return Err(BadPath);
        }

        match dir::lookup(disk, &inode, name)? {
            Some(child) => {
                table.switch_to(disk, child)?;
                if leaf {
                    return Ok(Walk::Found {
                        parent: current,
                        inode: child,
                    });
                }
                current = child;
            }
            None if leaf => {
                return Ok(Walk::Missing {
                    parent: current,
                    name: name.to_owned(),
                });
            }
            None => {
                debug!("walk: intermediate component '{name}' not found");
                return Err(BadPath);
            }
        }
    }

    unreachable!("loop returns on the leaf component");
}
