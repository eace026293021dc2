/// size of a disk sector (bytes)
pub const SECTOR_SIZE: usize = 512;
/// total number of sectors on the simulated disk
pub const TOTAL_SECTORS: usize = 10_000;
/// maximum number of files and directories (inode table entries)
pub const MAX_FILES: usize = 1_000;
/// max data sectors referenced by a single inode
pub const MAX_SECTORS_PER_FILE: usize = 30;
/// max length of a file name, including the terminating NUL
pub const MAX_NAME: usize = 16;
/// max number of files open at once
pub const MAX_OPEN_FILES: usize = 256;
