use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use shadowfs_core::config::{
    DEFAULT_BLOCK_SIZE, DEFAULT_MAX_FILES, DEFAULT_MAX_OPEN_FILES, DEFAULT_TOTAL_BLOCKS,
};
use shadowfs_core::{FileSystem, FsConfig};
use shadowfs_disk::FileDisk;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Path to the disk image
    #[arg(short, long)]
    disk: PathBuf,

    /// Block size in bytes
    #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Number of blocks in the image
    #[arg(short = 'n', long, default_value_t = DEFAULT_TOTAL_BLOCKS)]
    blocks: u32,

    /// Directory slots, including the two metadata slots
    #[arg(short, long, default_value_t = DEFAULT_MAX_FILES)]
    inodes: u32,

    /// Force overwrite
    #[arg(short, long)]
    force: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    if cli.disk.exists() && !cli.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            cli.disk.display()
        );
    }

    let config = FsConfig {
        block_size: cli.block_size,
        total_blocks: cli.blocks,
        max_files: cli.inodes,
        max_open_files: DEFAULT_MAX_OPEN_FILES,
    };
    let geometry = config.validate().context("invalid geometry")?;

    println!(
        "Formatting {} ({} blocks of {} bytes)...",
        cli.disk.display(),
        geometry.total_blocks,
        geometry.block_size
    );

    let fs = FileSystem::<FileDisk>::open_image(&cli.disk, &config, true)
        .with_context(|| format!("failed to format {}", cli.disk.display()))?;

    println!("Superblock: {:#?}", fs.superblock());
    println!(
        "Directory: blocks {:?}, {} file slots; {} blocks free",
        geometry.directory_range(),
        fs.stat().max_files,
        fs.free_map().free_count()
    );
    println!("Format complete.");

    Ok(())
}
