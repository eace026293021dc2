use std::env::args;
use std::io::{self, Read, Write};
use std::process;

use sectorfs::param::{MAX_FILES, TOTAL_SECTORS};
use sectorfs::policy::Interactive;
use sectorfs::{FileSystem, FsError};

fn main() {
    env_logger::init();

    let mut args: Vec<String> = args().collect();

    let interactive = args.len() > 1 && args[1] == "-i";
    if interactive {
        args.remove(1);
    }

    if args.len() < 3 {
        print_usage();
    }

    if let Err(e) = run(&args, interactive) {
        eprintln!("sectorfs: {e}");
        process::exit(1);
    }
}

fn print_usage() -> ! {
    eprintln!("Usage: sectorfs [-i] <fs.img> <command> [path]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  format          create the image (or verify an existing one)");
    eprintln!("  stat            print allocation counts");
    eprintln!("  ls <path>       list a directory");
    eprintln!("  mkdir <path>    create a directory");
    eprintln!("  create <path>   create an empty file");
    eprintln!("  write <path>    append stdin to a file");
    eprintln!("  cat <path>      print a file");
    eprintln!("  rm <path>       remove a file");
    eprintln!("  rmdir <path>    remove an empty directory");
    eprintln!();
    eprintln!("With -i, overwrite and out-of-space decisions are prompted for.");
    process::exit(1);
}

fn run(args: &[String], interactive: bool) -> Result<(), FsError> {
    let mut fs = FileSystem::boot(&args[1])?;
    if interactive {
        fs.set_overwrite_policy(Box::new(Interactive));
        fs.set_tail_policy(Box::new(Interactive));
    }

    match (args[2].as_str(), args.get(3)) {
        ("format", None) => fs.sync(),
        ("stat", None) => {
            let used = fs.usage()?;
            println!("inodes:  {:>6} / {}", used.inodes, MAX_FILES);
            println!("sectors: {:>6} / {}", used.sectors, TOTAL_SECTORS);
            Ok(())
        }
        ("ls", Some(path)) => {
            for entry in fs.list_dir(path)? {
                println!("{:>4}  {}", entry.inode, entry.name());
            }
            Ok(())
        }
        ("mkdir", Some(path)) => {
            fs.create_dir(path)?;
            fs.sync()
        }
        ("create", Some(path)) => {
            fs.create_file(path)?;
            fs.sync()
        }
        ("write", Some(path)) => {
            let mut data = Vec::new();
            io::stdin().read_to_end(&mut data)?;

            let fd = fs.open(path)?;
            let written = fs.write(fd, &data)?;
            if written < data.len() {
                eprintln!("sectorfs: wrote {written} of {} bytes", data.len());
            }
            fs.close(fd)?;
            fs.sync()
        }
        ("cat", Some(path)) => {
            let fd = fs.open(path)?;
            let mut buf = [0u8; 4096];
            loop {
                let n = fs.read(fd, &mut buf)?;
                if n == 0 {
                    break;
                }
                io::stdout().write_all(&buf[..n])?;
            }
            fs.close(fd)
        }
        ("rm", Some(path)) => {
            fs.unlink_file(path)?;
            fs.sync()
        }
        ("rmdir", Some(path)) => {
            fs.unlink_dir(path)?;
            fs.sync()
        }
        _ => print_usage(),
    }
}
