use std::io;

use bytemuck::{Pod, Zeroable};
use log::debug;

use crate::bitmap::{INODE_BITMAP, SECTOR_BITMAP};
use crate::disk::{Disk, ZERO_SECTOR};
use crate::error::FsError;
use crate::inode::{Inode, InodeKind, InodeSector};
use crate::param::{MAX_NAME, MAX_SECTORS_PER_FILE, SECTOR_SIZE};

/// On-disk directory entry: a NUL-padded name and an inode number.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DirEntry {
    pub name: [u8; MAX_NAME],
    pub inode: u32,
}

pub const DIRENT_SIZE: usize = size_of::<DirEntry>();
/// Directory entries per data sector; the sector tail is padding
pub const DIRENTS_PER_SECTOR: usize = SECTOR_SIZE / DIRENT_SIZE;

impl DirEntry {
    pub fn new(name: &str, inode: u32) -> Self {
        let mut entry = Self {
            name: [0; MAX_NAME],
            inode,
        };
        entry.set_name(name);
        entry
    }

    pub fn set_name(&mut self, name: &str) {
        self.name.fill(0);
        let bytes = name.as_bytes();
        let len = bytes.len().min(MAX_NAME - 1);
        self.name[..len].copy_from_slice(&bytes[..len]);
    }

    fn name_bytes(&self) -> &[u8] {
        let end = self.name.iter().position(|&c| c == 0).unwrap_or(MAX_NAME);
        &self.name[..end]
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    pub fn name_matches(&self, name: &str) -> bool {
        self.name_bytes() == name.as_bytes()
    }
}

/// Entry `index` of a dirent sector buffer.
fn entry_at(buf: &[u8; SECTOR_SIZE], index: usize) -> DirEntry {
    let offset = index * DIRENT_SIZE;
    bytemuck::pod_read_unaligned(&buf[offset..offset + DIRENT_SIZE])
}

fn put_entry(buf: &mut [u8; SECTOR_SIZE], index: usize, entry: &DirEntry) {
    let offset = index * DIRENT_SIZE;
    buf[offset..offset + DIRENT_SIZE].copy_from_slice(bytemuck::bytes_of(entry));
}

/// Searches `parent`'s entries for `name` and returns the child's inode
/// number, reading one dirent sector at a time.
pub fn lookup(disk: &Disk, parent: &Inode, name: &str) -> io::Result<Option<usize>> {
    let nentries = parent.size as usize;

    let mut index = 0;
    let mut group = 0;
    while index < nentries {
        let mut buf = ZERO_SECTOR;
        disk.read_sector(parent.data[group] as usize, &mut buf)?;

        for slot in 0..DIRENTS_PER_SECTOR {
            if index >= nentries {
                break;
            }
            let entry = entry_at(&buf, slot);
            if entry.name_matches(name) {
                return Ok(Some(entry.inode as usize));
            }
            index += 1;
        }
        group += 1;
    }

    Ok(None)
}

/// Allocates a fresh inode of `kind` and appends a dirent for it to the
/// directory `parent_inum`. Returns the new inode number.
///
/// The caller has already verified that `name` is legal and not present.
pub fn add_child(
    disk: &mut Disk,
    parent_inum: usize,
    kind: InodeKind,
    name: &str,
) -> Result<usize, FsError> {
    let child_inum = match INODE_BITMAP.allocate(disk).map_err(|_| FsError::Create)? {
        Some(inum) => inum,
        None => {
            debug!("add_child: inode table is full");
            return Err(FsError::Create);
        }
    };

    // write the zeroed child record first, then re-read the table for the
    // parent in case both live in the same sector
    let mut table = InodeSector::load(disk, child_inum).map_err(|_| FsError::Create)?;
    table.put(child_inum, &Inode::empty(kind));
    table.store(disk).map_err(|_| FsError::Create)?;

    table
        .switch_to(disk, parent_inum)
        .map_err(|_| FsError::Create)?;
    let mut parent = table.get(parent_inum);
    if !parent.is_dir() {
        debug!("add_child: parent inode {parent_inum} is not a directory");
        return Err(FsError::Create);
    }

    let nentries = parent.size as usize;
    let group = nentries / DIRENTS_PER_SECTOR;
    if group >= MAX_SECTORS_PER_FILE {
        debug!("add_child: directory {parent_inum} is full");
        return Err(FsError::Create);
    }

    let mut buf = ZERO_SECTOR;
    if nentries % DIRENTS_PER_SECTOR == 0 {
        // first entry of a new group needs a fresh sector
        let sector = match SECTOR_BITMAP.allocate(disk).map_err(|_| FsError::Create)? {
            Some(sector) => sector,
            None => {
                debug!("add_child: disk is full");
                return Err(FsError::Create);
            }
        };
        parent.data[group] = sector as u32;
        debug!("add_child: new sector {sector} for dirent group {group}");
    } else {
        disk.read_sector(parent.data[group] as usize, &mut buf)
            .map_err(|_| FsError::Create)?;
    }

    put_entry(
        &mut buf,
        nentries % DIRENTS_PER_SECTOR,
        &DirEntry::new(name, child_inum as u32),
    );
    disk.write_sector(parent.data[group] as usize, &buf)
        .map_err(|_| FsError::Create)?;

    parent.size += 1;
    table.put(parent_inum, &parent);
    table.store(disk).map_err(|_| FsError::Create)?;

    debug!("add_child: created inode {child_inum} ('{name}') under {parent_inum}");
    Ok(child_inum)
}

/// Failure modes of `remove_child`, translated to API error kinds by the
/// caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveError {
    General,
    NotEmpty,
    WrongType,
}

impl From<io::Error> for RemoveError {
    fn from(_value: io::Error) -> Self {
        Self::General
    }
}

/// Destroys inode `child_inum` and removes its dirent from the directory
/// `parent_inum`.
///
/// Files have their data sectors zeroed and freed; directories must be
/// empty. The dirent is removed by swapping the last entry into its slot so
/// the entry array stays packed.
pub fn remove_child(
    disk: &mut Disk,
    parent_inum: usize,
    child_inum: usize,
    expected: InodeKind,
) -> Result<(), RemoveError> {
    let mut table = InodeSector::load(disk, child_inum)?;
    let child = table.get(child_inum);

    if child.kind != expected {
        debug!("remove_child: inode {child_inum} has the wrong type");
        return Err(RemoveError::WrongType);
    }
    if child.is_dir() && child.size > 0 {
        debug!("remove_child: directory {child_inum} is not empty");
        return Err(RemoveError::NotEmpty);
    }

    if !child.is_dir() {
        for slot in 0..child.sector_count() {
            let sector = child.data[slot] as usize;
            disk.write_sector(sector, &ZERO_SECTOR)?;
            SECTOR_BITMAP
                .free(disk, sector)
                .map_err(|_| RemoveError::General)?;
        }
    }

    table.put(child_inum, &Inode::empty(InodeKind::FILE));
    table.store(disk)?;
    INODE_BITMAP
        .free(disk, child_inum)
        .map_err(|_| RemoveError::General)?;

    table.switch_to(disk, parent_inum)?;
    let mut parent = table.get(parent_inum);
    if !parent.is_dir() {
        return Err(RemoveError::WrongType);
    }
    let nentries = parent.size as usize;
    if nentries == 0 {
        return Err(RemoveError::General);
    }

    let Some((group, slot)) = find_entry(disk, &parent, nentries, child_inum)? else {
        debug!("remove_child: dirent for inode {child_inum} not found in {parent_inum}");
        return Err(RemoveError::General);
    };

    let last_group = (nentries - 1) / DIRENTS_PER_SECTOR;
    let last_slot = (nentries - 1) % DIRENTS_PER_SECTOR;

    let mut buf = ZERO_SECTOR;
    disk.read_sector(parent.data[group] as usize, &mut buf)?;

    if group == last_group {
        let last = entry_at(&buf, last_slot);
        put_entry(&mut buf, slot, &last);
        put_entry(&mut buf, last_slot, &DirEntry::zeroed());
        disk.write_sector(parent.data[group] as usize, &buf)?;
    } else {
        let mut last_buf = ZERO_SECTOR;
        disk.read_sector(parent.data[last_group] as usize, &mut last_buf)?;
        let last = entry_at(&last_buf, last_slot);
        put_entry(&mut buf, slot, &last);
        put_entry(&mut last_buf, last_slot, &DirEntry::zeroed());
        disk.write_sector(parent.data[group] as usize, &buf)?;
        disk.write_sector(parent.data[last_group] as usize, &last_buf)?;
    }

    // removing the only entry of the last group frees its sector
    if last_slot == 0 {
        SECTOR_BITMAP
            .free(disk, parent.data[last_group] as usize)
            .map_err(|_| RemoveError::General)?;
        parent.data[last_group] = 0;
    }

    parent.size -= 1;
    table.put(parent_inum, &parent);
    table.store(disk)?;

    debug!("remove_child: removed inode {child_inum} from {parent_inum}");
    Ok(())
}

/// Locates the dirent pointing at `child_inum`, scanning every group.
fn find_entry(
    disk: &Disk,
    parent: &Inode,
    nentries: usize,
    child_inum: usize,
) -> io::Result<Option<(usize, usize)>> {
    let mut index = 0;
    let mut group = 0;
    while index < nentries {
        let mut buf = ZERO_SECTOR;
        disk.read_sector(parent.data[group] as usize, &mut buf)?;

        for slot in 0..DIRENTS_PER_SECTOR {
            if index >= nentries {
                break;
            }
            if entry_at(&buf, slot).inode as usize == child_inum {
                return Ok(Some((group, slot)));
            }
            index += 1;
        }
        group += 1;
    }
    Ok(None)
}

/// Copies the directory's entries into `buf` as packed records, stripping
/// the per-sector tail padding. Returns the entry count.
///
/// The caller has checked that `buf` is large enough.
pub fn read_entries(disk: &Disk, dir: &Inode, buf: &mut [u8]) -> io::Result<usize> {
    let nentries = dir.size as usize;

    let mut index = 0;
    let mut group = 0;
    while index < nentries {
        let mut sector = ZERO_SECTOR;
        disk.read_sector(dir.data[group] as usize, &mut sector)?;

        let in_group = (nentries - index).min(DIRENTS_PER_SECTOR);
        let out = index * DIRENT_SIZE;
        buf[out..out + in_group * DIRENT_SIZE]
            .copy_from_slice(&sector[..in_group * DIRENT_SIZE]);

        index += in_group;
        group += 1;
    }

    Ok(nentries)
}
