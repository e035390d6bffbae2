use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::debug;
use shadowfs_core::config::{DEFAULT_BLOCK_SIZE, DEFAULT_MAX_OPEN_FILES, DEFAULT_TOTAL_BLOCKS};
use shadowfs_core::{FileSystem, FsConfig, VersionId};
use shadowfs_disk::{BlockDevice, FileDisk};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the disk image
    #[arg(short, long)]
    disk: PathBuf,

    /// Block size the image was formatted with
    #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Number of blocks in the image
    #[arg(short = 'n', long, default_value_t = DEFAULT_TOTAL_BLOCKS)]
    blocks: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List files with their sizes
    Ls,
    /// Copy a host file (or stdin) into the image
    Put {
        /// Name inside the image
        name: String,

        /// Host file to read; stdin when omitted
        #[arg(short, long)]
        from: Option<PathBuf>,

        /// Append to an existing file instead of replacing it
        #[arg(short, long)]
        append: bool,
    },
    /// Write a file's contents to stdout
    Cat { name: String },
    /// Remove a file
    Rm { name: String },
    /// Record the current directory as a new version
    Commit,
    /// Bring back a committed version
    Restore { version: VersionId },
    /// Show usage and retained versions
    Stat,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = FsConfig {
        block_size: cli.block_size,
        total_blocks: cli.blocks,
        max_open_files: DEFAULT_MAX_OPEN_FILES,
        ..FsConfig::default()
    };
    let mut fs = FileSystem::<FileDisk>::open_image(&cli.disk, &config, false)
        .with_context(|| format!("failed to mount {}", cli.disk.display()))?;

    match cli.command {
        Commands::Ls => {
            for file in fs.list() {
                println!("{:>8} {:>3} {}", file.size, file.blocks, file.name);
            }
        }
        Commands::Put { name, from, append } => {
            let data = match &from {
                Some(path) => std::fs::read(path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut data = Vec::new();
                    std::io::stdin().read_to_end(&mut data)?;
                    data
                }
            };
            put(&mut fs, &name, &data, append)?;
            println!("{}: {} bytes written", name, data.len());
        }
        Commands::Cat { name } => {
            let data = cat(&mut fs, &name)?;
            std::io::stdout().write_all(&data)?;
        }
        Commands::Rm { name } => {
            fs.remove(&name).with_context(|| format!("cannot remove {}", name))?;
        }
        Commands::Commit => {
            let version = fs.commit().context("commit failed")?;
            println!("Committed version {}", version);
        }
        Commands::Restore { version } => {
            fs.restore(version)
                .with_context(|| format!("cannot restore version {}", version))?;
            println!("Restored version {}", version);
        }
        Commands::Stat => {
            let stat = fs.stat();
            println!("Block size:    {}", stat.block_size);
            println!(
                "Blocks:        {} ({} free)",
                stat.total_blocks, stat.free_blocks
            );
            println!("Files:         {} of {}", stat.files, stat.max_files);
            println!("Versions:      {:?}", stat.versions);
        }
    }

    Ok(())
}

fn put<D: BlockDevice>(
    fs: &mut FileSystem<D>,
    name: &str,
    data: &[u8],
    append: bool,
) -> Result<()> {
    if !append {
        if let Some(slot) = fs.directory().lookup(name) {
            check_replace(fs, slot, name, data.len())?;
            debug!("replacing {}", name);
            fs.remove(name).with_context(|| format!("cannot replace {}", name))?;
        }
    }

    let fd = fs
        .open(name)
        .with_context(|| format!("cannot open {}", name))?;
    let written = if data.is_empty() {
        Ok(0)
    } else {
        fs.write(fd, data)
    };
    fs.close(fd)?;
    written.with_context(|| format!("cannot write {}", name))?;
    Ok(())
}

/// Fails if the new contents could not be written once the old file is gone.
fn check_replace<D: BlockDevice>(
    fs: &FileSystem<D>,
    slot: usize,
    name: &str,
    len: usize,
) -> Result<()> {
    let max = fs.geometry().max_file_size();
    if len > max {
        bail!("cannot replace {}: {} bytes exceeds the {} byte file limit", name, len, max);
    }

    let needed = len.div_ceil(fs.geometry().block_size);
    let released = fs
        .directory()
        .inode(slot)
        .blocks()
        .filter(|&block| !fs.is_pinned(block))
        .count();
    let free = fs.free_map().free_count() + released;
    if needed > free {
        bail!("cannot replace {}: needs {} blocks, {} available", name, needed, free);
    }
    Ok(())
}

fn cat<D: BlockDevice>(fs: &mut FileSystem<D>, name: &str) -> Result<Vec<u8>> {
    if fs.directory().lookup(name).is_none() {
        bail!("no such file: {}", name);
    }
    let fd = fs
        .open(name)
        .with_context(|| format!("cannot open {}", name))?;
    let size = fs.size(fd)?;
    let mut data = vec![0u8; size];
    let read = if size == 0 {
        Ok(0)
    } else {
        fs.read(fd, &mut data)
    };
    fs.close(fd)?;
    let read = read.with_context(|| format!("cannot read {}", name))?;
    data.truncate(read);
    Ok(data)
}
