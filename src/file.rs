use log::{debug, trace};

use crate::bitmap::SECTOR_BITMAP;
use crate::disk::{Disk, ZERO_SECTOR};
use crate::error::FsError;
use crate::inode::{Inode, InodeSector};
use crate::param::{MAX_OPEN_FILES, MAX_SECTORS_PER_FILE, SECTOR_SIZE};
use crate::policy::{OverwriteAction, OverwritePolicy, TailAction, TailPolicy};

/// Maximum file size in bytes
pub const MAX_FILE_SIZE: usize = MAX_SECTORS_PER_FILE * SECTOR_SIZE;

/// An open-file record.
///
/// The cursor is kept as a (sector-offset, byte-within-sector) pair; the
/// byte position within the file is `pos * SECTOR_SIZE + pos_byte`. A slot
/// with `inode == 0` is free — inode 0 is the root directory, which can
/// never be opened as a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFile {
    pub inode: usize,
    /// File size in bytes, cached from the inode
    pub size: u32,
    /// Index into the inode's data slots
    pub pos: usize,
    /// Byte offset within that sector, always below `SECTOR_SIZE`
    pub pos_byte: usize,
}

impl OpenFile {
    /// Cursor position in bytes from the start of the file.
    pub fn cursor(&self) -> usize {
        self.pos * SECTOR_SIZE + self.pos_byte
    }

    pub fn at_eof(&self) -> bool {
        self.cursor() == self.size as usize
    }

    fn seek_to(&mut self, offset: usize) {
        self.pos = offset / SECTOR_SIZE;
        self.pos_byte = offset % SECTOR_SIZE;
    }

    /// Advances the cursor by `n` bytes, rolling over into the next sector.
    fn advance(&mut self, n: usize) {
        self.seek_to(self.cursor() + n);
    }
}

/// Fixed-capacity table of open files, indexed by descriptor.
#[derive(Debug)]
pub struct OpenFileTable {
    slots: [OpenFile; MAX_OPEN_FILES],
}

impl OpenFileTable {
    pub fn new() -> Self {
        Self {
            slots: [OpenFile::default(); MAX_OPEN_FILES],
        }
    }

    /// Lowest-indexed free descriptor.
    pub fn free_fd(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.inode == 0)
    }

    /// Whether any descriptor currently refers to `inum`.
    pub fn is_open(&self, inum: usize) -> bool {
        inum != 0 && self.slots.iter().any(|slot| slot.inode == inum)
    }

    pub fn open_at(&mut self, fd: usize, inum: usize, size: u32) {
        self.slots[fd] = OpenFile {
            inode: inum,
            size,
            pos: 0,
            pos_byte: 0,
        };
    }

    pub fn get(&self, fd: usize) -> Result<&OpenFile, FsError> {
        match self.slots.get(fd) {
            Some(slot) if slot.inode != 0 => Ok(slot),
            _ => Err(FsError::BadFd),
        }
    }

    pub fn get_mut(&mut self, fd: usize) -> Result<&mut OpenFile, FsError> {
        match self.slots.get_mut(fd) {
            Some(slot) if slot.inode != 0 => Ok(slot),
            _ => Err(FsError::BadFd),
        }
    }

    pub fn close(&mut self, fd: usize) -> Result<(), FsError> {
        self.get_mut(fd)?.inode = 0;
        Ok(())
    }
}

impl Default for OpenFileTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads from the file's cursor into `buf` and advances the cursor.
/// Returns the number of bytes read; 0 at end of file.
pub fn read(disk: &Disk, file: &mut OpenFile, buf: &mut [u8]) -> Result<usize, FsError> {
    let size = file.size as usize;
    if size == 0 || file.cursor() >= size {
        return Ok(0);
    }

    let table = InodeSector::load(disk, file.inode)?;
    let inode = table.get(file.inode);

    let n = buf.len().min(size - file.cursor());
    if n < buf.len() {
        trace!(
            "read: only {n} of {} bytes left before end of file",
            buf.len()
        );
    }

    // leading partial sector, full middle sectors, trailing partial sector
    let mut total = 0;
    while total < n {
        let mut sector = ZERO_SECTOR;
        disk.read_sector(inode.data[file.pos] as usize, &mut sector)?;

        let m = (n - total).min(SECTOR_SIZE - file.pos_byte);
        buf[total..total + m].copy_from_slice(&sector[file.pos_byte..file.pos_byte + m]);

        total += m;
        file.advance(m);
    }

    Ok(total)
}

/// Writes `buf` at the file's cursor, allocating data sectors on demand,
/// and advances the cursor.
///
/// A cursor away from end of file consults `overwrite_policy` first; a
/// write larger than the remaining capacity consults `tail_policy`. Returns
/// the number of bytes written (0 when a policy cancels).
pub fn write(
    disk: &mut Disk,
    file: &mut OpenFile,
    buf: &[u8],
    overwrite_policy: &mut dyn OverwritePolicy,
    tail_policy: &mut dyn TailPolicy,
) -> Result<usize, FsError> {
    if file.size as usize == MAX_FILE_SIZE {
        debug!("write: file (inode {}) is already at max size", file.inode);
        return Err(FsError::FileTooBig);
    }

    let mut table = InodeSector::load(disk, file.inode)?;
    let mut inode = table.get(file.inode);

    if !file.at_eof() {
        match overwrite_policy.on_non_empty(file) {
            OverwriteAction::Cancel => return Ok(0),
            OverwriteAction::Append => {
                file.seek_to(file.size as usize);
            }
            OverwriteAction::Overwrite => {
                for slot in 0..inode.sector_count() {
                    let sector = inode.data[slot] as usize;
                    disk.write_sector(sector, &ZERO_SECTOR)?;
                    SECTOR_BITMAP
                        .free(disk, sector)
                        .map_err(|_| FsError::General)?;
                    inode.data[slot] = 0;
                }
                inode.size = 0;
                table.put(file.inode, &inode);
                table.store(disk)?;

                file.size = 0;
                file.seek_to(0);
                debug!("write: truncated inode {} before overwrite", file.inode);
            }
        }
    }

    let available = MAX_FILE_SIZE - file.size as usize;
    let mut n = buf.len();
    if available < n {
        match tail_policy.on_insufficient_space(file, n, available) {
            TailAction::Cancel => return Ok(0),
            TailAction::Clip => {
                debug!("write: clipping {n} bytes to the {available} that fit");
                n = available;
            }
        }
    }

    let mut total = 0;
    while total < n {
        let mut sector = ZERO_SECTOR;
        if file.pos_byte == 0 {
            // the cursor is at end of file, so a sector boundary means the
            // next data slot is still unallocated
            let Some(new) = SECTOR_BITMAP.allocate(disk).map_err(|_| FsError::General)? else {
                debug!("write: disk is full after {total} bytes");
                finish(disk, &mut table, &mut inode, file)?;
                return Err(FsError::NoSpace);
            };
            inode.data[file.pos] = new as u32;
        } else {
            disk.read_sector(inode.data[file.pos] as usize, &mut sector)?;
        }

        let m = (n - total).min(SECTOR_SIZE - file.pos_byte);
        sector[file.pos_byte..file.pos_byte + m].copy_from_slice(&buf[total..total + m]);
        disk.write_sector(inode.data[file.pos] as usize, &sector)?;

        total += m;
        file.advance(m);
    }

    finish(disk, &mut table, &mut inode, file)?;
    trace!("write: inode {} now {} bytes ({total} written)", file.inode, file.size);
    Ok(total)
}

/// Persists the inode after a write: the size grows to the cursor and the
/// data slots filled along the way go with it.
fn finish(
    disk: &mut Disk,
    table: &mut InodeSector,
    inode: &mut Inode,
    file: &mut OpenFile,
) -> Result<(), FsError> {
    let new_size = (file.size as usize).max(file.cursor());
    inode.size = new_size as u32;
    file.size = new_size as u32;
    table.put(file.inode, inode);
    table.store(disk)?;
    Ok(())
}

/// Moves the cursor to the absolute byte `offset`. Fails past the end of
/// file; returns the new sector-offset cursor.
pub fn seek(file: &mut OpenFile, offset: usize) -> Result<usize, FsError> {
    if offset >= file.size as usize {
        return Err(FsError::SeekOutOfBounds);
    }
    file.seek_to(offset);
    Ok(file.pos)
}
