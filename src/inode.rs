use std::io;

use bytemuck::{Pod, Zeroable};

use crate::disk::{Disk, Sector, ZERO_SECTOR};
use crate::layout::INODE_TABLE_START_SECTOR;
use crate::param::{MAX_SECTORS_PER_FILE, SECTOR_SIZE};

/// Inode kind tag, a 32-bit integer on disk.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct InodeKind(pub u32);

impl InodeKind {
    pub const FILE: Self = Self(0);
    pub const DIRECTORY: Self = Self(1);
}

/// On-disk inode record.
///
/// `size` is a byte count for files and an entry count for directories.
/// Records are packed `INODES_PER_SECTOR` to a sector and never straddle a
/// sector boundary; the sector tail is padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Inode {
    pub size: u32,
    pub kind: InodeKind,
    /// Data sector indices; unused slots are 0
    pub data: [u32; MAX_SECTORS_PER_FILE],
}

pub const INODE_SIZE: usize = size_of::<Inode>();
/// Inodes per table sector
pub const INODES_PER_SECTOR: usize = SECTOR_SIZE / INODE_SIZE;

impl Inode {
    pub fn empty(kind: InodeKind) -> Self {
        Self {
            size: 0,
            kind,
            data: [0; MAX_SECTORS_PER_FILE],
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::DIRECTORY
    }

    /// Number of data sectors a file of this size occupies.
    pub fn sector_count(&self) -> usize {
        (self.size as usize).div_ceil(SECTOR_SIZE)
    }
}

/// One cached sector of the inode table.
///
/// The path walker and the directory code carry one of these around so
/// consecutive inodes living in the same table sector share a single read.
#[derive(Debug, Clone)]
pub struct InodeSector {
    sector: usize,
    buf: Sector,
}

impl InodeSector {
    /// Table sector holding inode `inum`.
    pub fn sector_of(inum: usize) -> usize {
        INODE_TABLE_START_SECTOR + inum / INODES_PER_SECTOR
    }

    /// Reads the table sector that holds inode `inum`.
    pub fn load(disk: &Disk, inum: usize) -> io::Result<Self> {
        let sector = Self::sector_of(inum);
        let mut buf = ZERO_SECTOR;
        disk.read_sector(sector, &mut buf)?;
        Ok(Self { sector, buf })
    }

    /// Re-reads the buffer only when `inum` lives in a different sector.
    pub fn switch_to(&mut self, disk: &Disk, inum: usize) -> io::Result<()> {
        let sector = Self::sector_of(inum);
        if sector != self.sector {
            disk.read_sector(sector, &mut self.buf)?;
            self.sector = sector;
        }
        Ok(())
    }

    fn offset_of(&self, inum: usize) -> usize {
        debug_assert_eq!(Self::sector_of(inum), self.sector);
        (inum % INODES_PER_SECTOR) * INODE_SIZE
    }

    /// Copies record `inum` out of the buffer.
    pub fn get(&self, inum: usize) -> Inode {
        let offset = self.offset_of(inum);
        bytemuck::pod_read_unaligned(&self.buf[offset..offset + INODE_SIZE])
    }

    /// Copies `inode` into record `inum` in the buffer. The change reaches
    /// disk on the next `store`.
    pub fn put(&mut self, inum: usize, inode: &Inode) {
        let offset = self.offset_of(inum);
        self.buf[offset..offset + INODE_SIZE].copy_from_slice(bytemuck::bytes_of(inode));
    }

    /// Writes the buffered sector back to disk.
    pub fn store(&self, disk: &mut Disk) -> io::Result<()> {
        disk.write_sector(self.sector, &self.buf)
    }
}
