use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::bitmap::{INODE_BITMAP, SECTOR_BITMAP};
use crate::dir::{self, DIRENT_SIZE, DirEntry, RemoveError};
use crate::disk::{Disk, ZERO_SECTOR};
use crate::error::FsError;
use crate::file::{self, OpenFileTable};
use crate::inode::{Inode, InodeKind, InodeSector};
use crate::layout::{
    DATABLOCK_START_SECTOR, INODE_TABLE_SECTORS, INODE_TABLE_START_SECTOR, MAGIC,
    SUPERBLOCK_START_SECTOR,
};
use crate::path::{self, ROOT_INODE, Walk};
use crate::policy::{DefaultPolicy, OverwritePolicy, TailPolicy};

/// Allocated-resource counts read straight from the two bitmaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub inodes: usize,
    pub sectors: usize,
}

/// A mounted file system: the in-memory disk, the path of its backing
/// image, and the table of open files.
///
/// All state lives in this handle; two instances never share anything, so
/// tests can mount as many images as they like.
pub struct FileSystem {
    disk: Disk,
    image_path: PathBuf,
    open_files: OpenFileTable,
    overwrite_policy: Box<dyn OverwritePolicy>,
    tail_policy: Box<dyn TailPolicy>,
}

impl std::fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystem")
            .field("disk", &self.disk)
            .field("image_path", &self.image_path)
            .field("open_files", &self.open_files)
            .finish()
    }
}

impl FileSystem {
    /// Mounts the image at `path`. When no file exists there yet, a fresh
    /// file system is formatted and saved; an existing file must be a valid
    /// image of exactly the right length.
    pub fn boot<P: AsRef<Path>>(path: P) -> Result<Self, FsError> {
        let path = path.as_ref();

        let disk = match Disk::load(path) {
            Ok(disk) => {
                check_magic(&disk)?;
                info!("loaded image '{}'", path.display());
                disk
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("no image at '{}', formatting a new one", path.display());
                let mut disk = Disk::new();
                format(&mut disk)?;
                disk.save(path)?;
                disk
            }
            Err(e) => {
                debug!("boot: loading image failed: {e}");
                return Err(FsError::General);
            }
        };

        Ok(Self {
            disk,
            image_path: path.to_owned(),
            open_files: OpenFileTable::new(),
            overwrite_policy: Box::new(DefaultPolicy),
            tail_policy: Box::new(DefaultPolicy),
        })
    }

    /// Writes the in-memory disk back to the image file.
    pub fn sync(&mut self) -> Result<(), FsError> {
        self.disk.save(&self.image_path).map_err(|e| {
            debug!("sync: saving image failed: {e}");
            FsError::General
        })
    }

    /// Replaces the hook consulted when a write lands on a non-empty file.
    pub fn set_overwrite_policy(&mut self, policy: Box<dyn OverwritePolicy>) {
        self.overwrite_policy = policy;
    }

    /// Replaces the hook consulted when a write does not fit.
    pub fn set_tail_policy(&mut self, policy: Box<dyn TailPolicy>) {
        self.tail_policy = policy;
    }

    pub fn create_file(&mut self, path: &str) -> Result<(), FsError> {
        self.create(path, InodeKind::FILE)
    }

    pub fn create_dir(&mut self, path: &str) -> Result<(), FsError> {
        self.create(path, InodeKind::DIRECTORY)
    }

    fn create(&mut self, path: &str, kind: InodeKind) -> Result<(), FsError> {
        match path::walk(&self.disk, path) {
            Ok(Walk::Missing { parent, name }) => {
                dir::add_child(&mut self.disk, parent, kind, &name)?;
                Ok(())
            }
            Ok(_) => {
                debug!("create: '{path}' already exists");
                Err(FsError::Create)
            }
            Err(_) => {
                debug!("create: cannot follow '{path}'");
                Err(FsError::Create)
            }
        }
    }

    /// Opens the file at `path` and returns its descriptor. Each inode can
    /// be open through at most one descriptor at a time.
    pub fn open(&mut self, path: &str) -> Result<usize, FsError> {
        let Some(fd) = self.open_files.free_fd() else {
            return Err(FsError::TooManyOpenFiles);
        };

        let inum = match path::walk(&self.disk, path) {
            Ok(Walk::Found { inode, .. }) => inode,
            Ok(Walk::Missing { .. }) => return Err(FsError::NoSuchFile),
            Ok(Walk::Root) => return Err(FsError::General),
            Err(_) => return Err(FsError::General),
        };

        if self.open_files.is_open(inum) {
            debug!("open: inode {inum} is already open");
            return Err(FsError::FileInUse);
        }

        let table = InodeSector::load(&self.disk, inum)?;
        let inode = table.get(inum);
        if inode.is_dir() {
            debug!("open: '{path}' is a directory");
            return Err(FsError::General);
        }

        self.open_files.open_at(fd, inum, inode.size);
        Ok(fd)
    }

    /// Reads up to `buf.len()` bytes at the descriptor's cursor. Returns
    /// the bytes read; 0 at end of file.
    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> Result<usize, FsError> {
        let mut open_file = *self.open_files.get(fd)?;
        let result = file::read(&self.disk, &mut open_file, buf);
        *self.open_files.get_mut(fd)? = open_file;
        result
    }

    /// Writes `buf` at the descriptor's cursor, consulting the policies
    /// when the cursor is away from end of file or the bytes do not fit.
    /// Returns the bytes written.
    pub fn write(&mut self, fd: usize, buf: &[u8]) -> Result<usize, FsError> {
        let mut open_file = *self.open_files.get(fd)?;
        let result = file::write(
            &mut self.disk,
            &mut open_file,
            buf,
            self.overwrite_policy.as_mut(),
            self.tail_policy.as_mut(),
        );
        // keep the record coherent with the inode even on a failed write
        *self.open_files.get_mut(fd)? = open_file;
        result
    }

    /// Moves the descriptor's cursor to the absolute byte `offset`; returns
    /// the new sector-offset position.
    pub fn seek(&mut self, fd: usize, offset: usize) -> Result<usize, FsError> {
        file::seek(self.open_files.get_mut(fd)?, offset)
    }

    pub fn close(&mut self, fd: usize) -> Result<(), FsError> {
        self.open_files.close(fd)
    }

    /// Removes the file at `path`, freeing its inode and data sectors. Open
    /// files cannot be unlinked.
    pub fn unlink_file(&mut self, path: &str) -> Result<(), FsError> {
        match path::walk(&self.disk, path) {
            Ok(Walk::Found { parent, inode }) => {
                if self.open_files.is_open(inode) {
                    debug!("unlink: '{path}' is open");
                    return Err(FsError::FileInUse);
                }
                dir::remove_child(&mut self.disk, parent, inode, InodeKind::FILE).map_err(|e| {
                    match e {
                        RemoveError::WrongType => FsError::NoSuchFile,
                        _ => FsError::General,
                    }
                })
            }
            Ok(Walk::Missing { .. }) | Ok(Walk::Root) => Err(FsError::NoSuchFile),
            Err(_) => Err(FsError::General),
        }
    }

    /// Removes the empty directory at `path`. The root cannot be removed.
    pub fn unlink_dir(&mut self, path: &str) -> Result<(), FsError> {
        match path::walk(&self.disk, path) {
            Ok(Walk::Root) => Err(FsError::RootDir),
            Ok(Walk::Found { parent, inode }) => {
                dir::remove_child(&mut self.disk, parent, inode, InodeKind::DIRECTORY).map_err(
                    |e| match e {
                        RemoveError::WrongType => FsError::NoSuchDir,
                        RemoveError::NotEmpty => FsError::DirNotEmpty,
                        RemoveError::General => FsError::General,
                    },
                )
            }
            Ok(Walk::Missing { .. }) | Err(_) => Err(FsError::NoSuchDir),
        }
    }

    /// Byte length of the directory's entries (`entries * sizeof(dirent)`).
    pub fn dir_size(&self, path: &str) -> Result<usize, FsError> {
        let inode = self.lookup_dir(path)?;
        Ok(inode.size as usize * DIRENT_SIZE)
    }

    /// Copies the directory's entries into `buf` as packed dirent records
    /// and returns the entry count. `buf` must hold at least
    /// `dir_size(path)` bytes.
    pub fn read_dir(&self, path: &str, buf: &mut [u8]) -> Result<usize, FsError> {
        let inode = self.lookup_dir(path)?;

        let needed = inode.size as usize * DIRENT_SIZE;
        if buf.len() < needed {
            debug!("read_dir: need {needed} bytes, buffer holds {}", buf.len());
            return Err(FsError::BufferTooSmall);
        }

        buf[..needed].fill(0);
        dir::read_entries(&self.disk, &inode, buf).map_err(Into::into)
    }

    /// Decoded directory listing, in entry order.
    pub fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let inode = self.lookup_dir(path)?;
        let mut buf = vec![0u8; inode.size as usize * DIRENT_SIZE];
        dir::read_entries(&self.disk, &inode, &mut buf)?;
        Ok(buf
            .chunks_exact(DIRENT_SIZE)
            .map(|chunk| bytemuck::pod_read_unaligned::<DirEntry>(chunk))
            .collect())
    }

    /// Counts of allocated inodes and sectors.
    pub fn usage(&self) -> Result<Usage, FsError> {
        Ok(Usage {
            inodes: INODE_BITMAP.count_set(&self.disk)?,
            sectors: SECTOR_BITMAP.count_set(&self.disk)?,
        })
    }

    fn lookup_dir(&self, path: &str) -> Result<Inode, FsError> {
        let inum = match path::walk(&self.disk, path) {
            Ok(Walk::Root) => ROOT_INODE,
            Ok(Walk::Found { inode, .. }) => inode,
            Ok(Walk::Missing { .. }) | Err(_) => return Err(FsError::NoSuchDir),
        };

        let table = InodeSector::load(&self.disk, inum)?;
        let inode = table.get(inum);
        if !inode.is_dir() {
            debug!("'{path}' is not a directory");
            return Err(FsError::General);
        }
        Ok(inode)
    }
}

/// Writes a fresh file system onto `disk`: superblock, both bitmaps with
/// their reserved prefixes, and an inode table holding only the root
/// directory.
fn format(disk: &mut Disk) -> Result<(), FsError> {
    let mut buf = ZERO_SECTOR;
    buf[..4].copy_from_slice(&MAGIC.to_le_bytes());
    disk.write_sector(SUPERBLOCK_START_SECTOR, &buf)?;

    INODE_BITMAP.format(disk)?;
    SECTOR_BITMAP.format(disk)?;

    for i in 0..INODE_TABLE_SECTORS {
        disk.write_sector(INODE_TABLE_START_SECTOR + i, &ZERO_SECTOR)?;
    }

    let mut table = InodeSector::load(disk, ROOT_INODE)?;
    table.put(ROOT_INODE, &Inode::empty(InodeKind::DIRECTORY));
    table.store(disk)?;

    debug!("formatted: data blocks start at sector {DATABLOCK_START_SECTOR}");
    Ok(())
}

fn check_magic(disk: &Disk) -> Result<(), FsError> {
    let mut buf = ZERO_SECTOR;
    disk.read_sector(SUPERBLOCK_START_SECTOR, &mut buf)?;

    let magic = u32::from_le_bytes(buf[..4].try_into().unwrap());
    if magic != MAGIC {
        debug!("bad magic {magic:#x}, expected {MAGIC:#x}");
        return Err(FsError::General);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::MAX_FILE_SIZE;
    use crate::param::{MAX_OPEN_FILES, MAX_SECTORS_PER_FILE, SECTOR_SIZE, TOTAL_SECTORS};
    use crate::policy::{CancelPolicy, OverwriteAction, OverwritePolicy};

    use std::fs;

    use tempfile::TempDir;

    fn boot_temp() -> (FileSystem, TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.img");
        let fs = FileSystem::boot(&path).unwrap();
        (fs, dir, path)
    }

    fn names(fs: &FileSystem, path: &str) -> Vec<String> {
        fs.list_dir(path).unwrap().iter().map(|e| e.name()).collect()
    }

    /// A pattern that doesn't repeat with the sector size.
    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    struct AlwaysOverwrite;

    impl OverwritePolicy for AlwaysOverwrite {
        fn on_non_empty(&mut self, _file: &crate::file::OpenFile) -> OverwriteAction {
            OverwriteAction::Overwrite
        }
    }

    #[test]
    fn format_and_persist() {
        let (mut fs, _dir, path) = boot_temp();
        fs.sync().unwrap();

        let image = fs::read(&path).unwrap();
        assert_eq!(image.len(), Disk::IMAGE_SIZE);
        // little-endian magic
        assert_eq!(&image[..4], &[0xef, 0xbe, 0xad, 0xde]);
        // root inode allocated in the inode bitmap
        assert_eq!(image[SECTOR_SIZE] & 1, 1);
        // metadata sectors reserved in the sector bitmap
        assert_eq!(image[2 * SECTOR_SIZE], 0xff);

        assert_eq!(
            fs.usage().unwrap(),
            Usage {
                inodes: 1,
                sectors: DATABLOCK_START_SECTOR
            }
        );
    }

    #[test]
    fn reboot_keeps_contents() {
        let (mut fs, _dir, path) = boot_temp();
        fs.create_dir("/docs").unwrap();
        fs.create_file("/docs/readme").unwrap();

        let fd = fs.open("/docs/readme").unwrap();
        let data = pattern(700);
        assert_eq!(fs.write(fd, &data).unwrap(), 700);
        fs.close(fd).unwrap();
        fs.sync().unwrap();
        drop(fs);

        let mut fs = FileSystem::boot(&path).unwrap();
        let fd = fs.open("/docs/readme").unwrap();
        let mut buf = vec![0u8; 700];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 700);
        assert_eq!(buf, data);
    }

    #[test]
    fn boot_rejects_wrong_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.img");
        fs::write(&path, vec![0u8; Disk::IMAGE_SIZE - 1]).unwrap();

        assert_eq!(FileSystem::boot(&path).unwrap_err(), FsError::General);
    }

    #[test]
    fn boot_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.img");
        fs::write(&path, vec![0u8; Disk::IMAGE_SIZE]).unwrap();

        assert_eq!(FileSystem::boot(&path).unwrap_err(), FsError::General);
    }

    #[test]
    fn create_tree_and_list() {
        let (mut fs, _dir, _path) = boot_temp();

        fs.create_dir("/dir-1").unwrap();
        fs.create_file("/dir-1/file-1").unwrap();
        fs.create_dir("/dir-1/dir-2").unwrap();

        assert_eq!(fs.dir_size("/dir-1").unwrap(), 2 * DIRENT_SIZE);

        let mut buf = vec![0u8; 2 * DIRENT_SIZE];
        assert_eq!(fs.read_dir("/dir-1", &mut buf).unwrap(), 2);
        assert_eq!(names(&fs, "/dir-1"), ["file-1", "dir-2"]);

        assert_eq!(fs.dir_size("/").unwrap(), DIRENT_SIZE);
        assert_eq!(names(&fs, "/"), ["dir-1"]);
    }

    #[test]
    fn read_dir_buffer_too_small() {
        let (mut fs, _dir, _path) = boot_temp();
        fs.create_file("/a").unwrap();
        fs.create_file("/b").unwrap();

        let mut buf = vec![0u8; 2 * DIRENT_SIZE - 1];
        assert_eq!(
            fs.read_dir("/", &mut buf).unwrap_err(),
            FsError::BufferTooSmall
        );

        let mut buf = vec![0u8; 2 * DIRENT_SIZE];
        assert_eq!(fs.read_dir("/", &mut buf).unwrap(), 2);
    }

    #[test]
    fn write_then_read_round_trip() {
        let (mut fs, _dir, _path) = boot_temp();
        fs.create_file("/f").unwrap();

        let data = pattern(1024);
        let fd = fs.open("/f").unwrap();
        assert_eq!(fs.write(fd, &data).unwrap(), 1024);
        fs.close(fd).unwrap();

        let fd = fs.open("/f").unwrap();
        let mut buf = vec![0u8; 1024];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 1024);
        assert_eq!(buf, data);

        // cursor is at end of file now
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 0);
    }

    #[test]
    fn round_trip_across_sector_boundaries() {
        let (mut fs, _dir, _path) = boot_temp();
        fs.create_file("/f").unwrap();

        // not a multiple of the sector size, spans four sectors
        let data = pattern(3 * SECTOR_SIZE + 100);
        let fd = fs.open("/f").unwrap();
        assert_eq!(fs.write(fd, &data).unwrap(), data.len());

        fs.seek(fd, 0).unwrap();
        let mut buf = vec![0u8; data.len()];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), data.len());
        assert_eq!(buf, data);

        // partial read starting inside a sector
        fs.seek(fd, SECTOR_SIZE + 13).unwrap();
        let mut buf = vec![0u8; 2 * SECTOR_SIZE];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 2 * SECTOR_SIZE);
        assert_eq!(buf, data[SECTOR_SIZE + 13..3 * SECTOR_SIZE + 13]);
    }

    #[test]
    fn read_clips_at_end_of_file() {
        let (mut fs, _dir, _path) = boot_temp();
        fs.create_file("/f").unwrap();

        let data = pattern(100);
        let fd = fs.open("/f").unwrap();
        fs.write(fd, &data).unwrap();
        fs.seek(fd, 40).unwrap();

        let mut buf = vec![0u8; 1000];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 60);
        assert_eq!(&buf[..60], &data[40..]);
    }

    #[test]
    fn default_policy_appends() {
        let (mut fs, _dir, _path) = boot_temp();
        fs.create_file("/f").unwrap();

        let fd = fs.open("/f").unwrap();
        fs.write(fd, &pattern(300)).unwrap();
        fs.close(fd).unwrap();

        // a fresh descriptor starts at position 0; the default policy
        // moves it to end of file instead of clobbering
        let fd = fs.open("/f").unwrap();
        assert_eq!(fs.write(fd, b"tail").unwrap(), 4);
        fs.seek(fd, 0).unwrap();

        let mut buf = vec![0u8; 304];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 304);
        assert_eq!(&buf[..300], &pattern(300)[..]);
        assert_eq!(&buf[300..], b"tail");
    }

    #[test]
    fn overwrite_policy_truncates_and_frees() {
        let (mut fs, _dir, _path) = boot_temp();
        fs.create_file("/f").unwrap();

        let fd = fs.open("/f").unwrap();
        fs.write(fd, &pattern(2 * SECTOR_SIZE)).unwrap();
        fs.close(fd).unwrap();

        // one dirent sector for the root, two data sectors for the file
        let used = fs.usage().unwrap();
        assert_eq!(used.sectors, DATABLOCK_START_SECTOR + 3);

        fs.set_overwrite_policy(Box::new(AlwaysOverwrite));
        let fd = fs.open("/f").unwrap();
        assert_eq!(fs.write(fd, b"fresh").unwrap(), 5);
        fs.seek(fd, 0).unwrap();

        let mut buf = vec![0u8; 100];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"fresh");

        // the two old sectors went back to the bitmap, one new one came out
        assert_eq!(fs.usage().unwrap().sectors, DATABLOCK_START_SECTOR + 2);
    }

    #[test]
    fn cancel_policy_writes_nothing() {
        let (mut fs, _dir, _path) = boot_temp();
        fs.create_file("/f").unwrap();

        let fd = fs.open("/f").unwrap();
        fs.write(fd, &pattern(10)).unwrap();
        fs.close(fd).unwrap();

        fs.set_overwrite_policy(Box::new(CancelPolicy));
        let fd = fs.open("/f").unwrap();
        assert_eq!(fs.write(fd, b"nope").unwrap(), 0);

        let mut buf = vec![0u8; 10];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 10);
        assert_eq!(buf, pattern(10));
    }

    #[test]
    fn tail_policy_clips_then_file_is_full() {
        let (mut fs, _dir, _path) = boot_temp();
        fs.create_file("/f").unwrap();

        let fd = fs.open("/f").unwrap();
        let data = pattern(MAX_FILE_SIZE + 123);
        assert_eq!(fs.write(fd, &data).unwrap(), MAX_FILE_SIZE);

        assert_eq!(fs.write(fd, b"x").unwrap_err(), FsError::FileTooBig);

        fs.seek(fd, 0).unwrap();
        let mut buf = vec![0u8; MAX_FILE_SIZE];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), MAX_FILE_SIZE);
        assert_eq!(buf, data[..MAX_FILE_SIZE]);
    }

    #[test]
    fn tail_cancel_writes_nothing() {
        let (mut fs, _dir, _path) = boot_temp();
        fs.create_file("/f").unwrap();
        fs.set_tail_policy(Box::new(CancelPolicy));

        let fd = fs.open("/f").unwrap();
        assert_eq!(fs.write(fd, &pattern(MAX_FILE_SIZE + 1)).unwrap(), 0);

        let mut buf = [0u8; 8];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 0);
    }

    #[test]
    fn seek_bounds() {
        let (mut fs, _dir, _path) = boot_temp();
        fs.create_file("/f").unwrap();

        let fd = fs.open("/f").unwrap();
        // an empty file has nowhere to seek to
        assert_eq!(fs.seek(fd, 0).unwrap_err(), FsError::SeekOutOfBounds);

        fs.write(fd, &pattern(1024)).unwrap();
        assert_eq!(fs.seek(fd, 1024).unwrap_err(), FsError::SeekOutOfBounds);
        assert_eq!(fs.seek(fd, 1023).unwrap(), 1);
        assert_eq!(fs.seek(fd, 511).unwrap(), 0);
    }

    #[test]
    fn open_twice_fails() {
        let (mut fs, _dir, _path) = boot_temp();
        fs.create_file("/f").unwrap();

        let fd = fs.open("/f").unwrap();
        assert_eq!(fs.open("/f").unwrap_err(), FsError::FileInUse);

        fs.close(fd).unwrap();
        let fd = fs.open("/f").unwrap();
        fs.close(fd).unwrap();
    }

    #[test]
    fn unlink_open_file_fails() {
        let (mut fs, _dir, _path) = boot_temp();
        fs.create_file("/f").unwrap();

        let fd = fs.open("/f").unwrap();
        assert_eq!(fs.unlink_file("/f").unwrap_err(), FsError::FileInUse);

        fs.close(fd).unwrap();
        fs.unlink_file("/f").unwrap();
        assert_eq!(fs.open("/f").unwrap_err(), FsError::NoSuchFile);
    }

    #[test]
    fn create_and_unlink_are_not_idempotent() {
        let (mut fs, _dir, _path) = boot_temp();

        fs.create_file("/f").unwrap();
        assert_eq!(fs.create_file("/f").unwrap_err(), FsError::Create);

        fs.create_dir("/d").unwrap();
        assert_eq!(fs.create_dir("/d").unwrap_err(), FsError::Create);

        fs.unlink_file("/f").unwrap();
        assert_eq!(fs.unlink_file("/f").unwrap_err(), FsError::NoSuchFile);

        fs.unlink_dir("/d").unwrap();
        assert_eq!(fs.unlink_dir("/d").unwrap_err(), FsError::NoSuchDir);
    }

    #[test]
    fn unlink_non_empty_dir_fails() {
        let (mut fs, _dir, _path) = boot_temp();
        fs.create_dir("/dir-1").unwrap();
        fs.create_file("/dir-1/file-1").unwrap();
        fs.create_dir("/dir-1/dir-2").unwrap();

        assert_eq!(fs.unlink_dir("/dir-1").unwrap_err(), FsError::DirNotEmpty);

        fs.unlink_file("/dir-1/file-1").unwrap();
        fs.unlink_dir("/dir-1/dir-2").unwrap();
        fs.unlink_dir("/dir-1").unwrap();

        assert_eq!(fs.dir_size("/").unwrap(), 0);
    }

    #[test]
    fn unlink_root_fails() {
        let (mut fs, _dir, _path) = boot_temp();
        fs.create_file("/f").unwrap();

        assert_eq!(fs.unlink_dir("/").unwrap_err(), FsError::RootDir);
        // root is untouched
        assert_eq!(fs.dir_size("/").unwrap(), DIRENT_SIZE);
        assert_eq!(fs.usage().unwrap().inodes, 2);
    }

    #[test]
    fn type_mismatches() {
        let (mut fs, _dir, _path) = boot_temp();
        fs.create_file("/f").unwrap();
        fs.create_dir("/d").unwrap();

        assert_eq!(fs.open("/d").unwrap_err(), FsError::General);
        assert_eq!(fs.unlink_file("/d").unwrap_err(), FsError::NoSuchFile);
        assert_eq!(fs.unlink_dir("/f").unwrap_err(), FsError::NoSuchDir);
        assert_eq!(fs.dir_size("/f").unwrap_err(), FsError::General);
        assert_eq!(fs.unlink_file("/").unwrap_err(), FsError::NoSuchFile);
    }

    #[test]
    fn missing_paths() {
        let (mut fs, _dir, _path) = boot_temp();
        fs.create_dir("/d").unwrap();

        assert_eq!(fs.open("/d/nope").unwrap_err(), FsError::NoSuchFile);
        assert_eq!(fs.dir_size("/nope").unwrap_err(), FsError::NoSuchDir);
        // a missing intermediate directory is a hard walk failure
        assert_eq!(fs.create_file("/nope/f").unwrap_err(), FsError::Create);
        assert_eq!(fs.open("/nope/f").unwrap_err(), FsError::General);
    }

    #[test]
    fn illegal_names_cannot_be_created() {
        let (mut fs, _dir, _path) = boot_temp();

        assert_eq!(fs.create_file("/with space").unwrap_err(), FsError::Create);
        assert_eq!(fs.create_file("/with*star").unwrap_err(), FsError::Create);
        assert_eq!(
            fs.create_file("/a-name-that-is-too-long").unwrap_err(),
            FsError::Create
        );
        assert_eq!(fs.create_file("relative").unwrap_err(), FsError::Create);
    }

    #[test]
    fn bitmap_sums_follow_live_data() {
        let (mut fs, _dir, _path) = boot_temp();
        let base = Usage {
            inodes: 1,
            sectors: DATABLOCK_START_SECTOR,
        };
        assert_eq!(fs.usage().unwrap(), base);

        fs.create_dir("/d").unwrap();
        fs.create_file("/d/f").unwrap();
        // dir "/" and "/d" each own one dirent sector; the empty file owns none
        assert_eq!(
            fs.usage().unwrap(),
            Usage {
                inodes: 3,
                sectors: DATABLOCK_START_SECTOR + 2
            }
        );

        let fd = fs.open("/d/f").unwrap();
        fs.write(fd, &pattern(SECTOR_SIZE + 1)).unwrap();
        fs.close(fd).unwrap();
        assert_eq!(
            fs.usage().unwrap(),
            Usage {
                inodes: 3,
                sectors: DATABLOCK_START_SECTOR + 4
            }
        );

        fs.unlink_file("/d/f").unwrap();
        fs.unlink_dir("/d").unwrap();
        assert_eq!(fs.usage().unwrap(), base);
    }

    #[test]
    fn directory_grows_across_dirent_groups() {
        let (mut fs, _dir, _path) = boot_temp();

        // 30 entries span two dirent sectors (25 per sector)
        for i in 0..30 {
            fs.create_file(&format!("/file-{i}")).unwrap();
        }
        assert_eq!(fs.dir_size("/").unwrap(), 30 * DIRENT_SIZE);
        assert_eq!(
            fs.usage().unwrap(),
            Usage {
                inodes: 31,
                sectors: DATABLOCK_START_SECTOR + 2
            }
        );

        let listed = names(&fs, "/");
        assert_eq!(listed.len(), 30);
        for i in 0..30 {
            assert!(listed.contains(&format!("file-{i}")));
        }
    }

    #[test]
    fn swap_delete_keeps_entries_packed() {
        let (mut fs, _dir, _path) = boot_temp();
        for i in 0..27 {
            fs.create_file(&format!("/file-{i}")).unwrap();
        }

        // removing from the first group pulls the last entry forward
        fs.unlink_file("/file-3").unwrap();
        let listed = names(&fs, "/");
        assert_eq!(listed.len(), 26);
        assert_eq!(listed[3], "file-26");

        // dropping below 26 entries frees the second dirent sector
        fs.unlink_file("/file-10").unwrap();
        assert_eq!(
            fs.usage().unwrap(),
            Usage {
                inodes: 1 + 25,
                sectors: DATABLOCK_START_SECTOR + 1
            }
        );

        let listed = names(&fs, "/");
        assert_eq!(listed.len(), 25);
        for name in listed {
            fs.unlink_file(&format!("/{name}")).unwrap();
        }
        assert_eq!(fs.dir_size("/").unwrap(), 0);
        assert_eq!(
            fs.usage().unwrap(),
            Usage {
                inodes: 1,
                sectors: DATABLOCK_START_SECTOR
            }
        );
    }

    #[test]
    fn too_many_open_files() {
        let (mut fs, _dir, _path) = boot_temp();

        for i in 0..MAX_OPEN_FILES {
            fs.create_file(&format!("/f{i}")).unwrap();
            assert_eq!(fs.open(&format!("/f{i}")).unwrap(), i);
        }

        fs.create_file("/one-more").unwrap();
        assert_eq!(
            fs.open("/one-more").unwrap_err(),
            FsError::TooManyOpenFiles
        );

        fs.close(17).unwrap();
        assert_eq!(fs.open("/one-more").unwrap(), 17);
    }

    #[test]
    fn disk_fills_up() {
        let (mut fs, _dir, _path) = boot_temp();

        // write max-size files while a whole one (plus a possible dirent
        // sector) still fits
        let chunk = pattern(MAX_FILE_SIZE);
        let mut i = 0;
        loop {
            let free = TOTAL_SECTORS - fs.usage().unwrap().sectors;
            if free < MAX_SECTORS_PER_FILE + 1 {
                break;
            }
            let name = format!("/f{i}");
            fs.create_file(&name).unwrap();
            let fd = fs.open(&name).unwrap();
            assert_eq!(fs.write(fd, &chunk).unwrap(), MAX_FILE_SIZE);
            fs.close(fd).unwrap();
            i += 1;
        }

        fs.create_file("/last").unwrap();
        let free = TOTAL_SECTORS - fs.usage().unwrap().sectors;
        assert!(free < MAX_SECTORS_PER_FILE);

        let fd = fs.open("/last").unwrap();
        assert_eq!(fs.write(fd, &chunk).unwrap_err(), FsError::NoSpace);
        assert_eq!(fs.usage().unwrap().sectors, TOTAL_SECTORS);

        // the bytes that made it in before the disk filled are readable
        fs.seek(fd, 0).unwrap();
        let mut buf = vec![0u8; MAX_FILE_SIZE];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), free * SECTOR_SIZE);
        assert_eq!(buf[..free * SECTOR_SIZE], chunk[..free * SECTOR_SIZE]);
    }

    #[test]
    fn image_stays_in_sync_only_after_sync() {
        let (mut fs, _dir, path) = boot_temp();
        fs.sync().unwrap();

        fs.create_file("/f").unwrap();
        // not synced yet; a second mount sees the old tree
        let other = FileSystem::boot(&path).unwrap();
        assert_eq!(other.dir_size("/").unwrap(), 0);

        fs.sync().unwrap();
        let other = FileSystem::boot(&path).unwrap();
        assert_eq!(other.dir_size("/").unwrap(), DIRENT_SIZE);
    }

    #[test]
    fn sector_reuse_after_unlink() {
        let (mut fs, _dir, _path) = boot_temp();
        fs.create_file("/a").unwrap();

        let fd = fs.open("/a").unwrap();
        fs.write(fd, &pattern(SECTOR_SIZE)).unwrap();
        fs.close(fd).unwrap();
        fs.unlink_file("/a").unwrap();

        // the freed sector comes back zeroed for the next file
        fs.create_file("/b").unwrap();
        let fd = fs.open("/b").unwrap();
        fs.write(fd, b"b").unwrap();
        fs.seek(fd, 0).unwrap();
        let mut buf = [0u8; 1];
        fs.read(fd, &mut buf).unwrap();
        assert_eq!(&buf, b"b");
    }
}
