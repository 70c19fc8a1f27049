//! Main entry point for the torrentzip CLI application.
//!
//! `create` walks a directory and writes a canonical archive; `verify`
//! checks an existing archive, local or behind an HTTP URL.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

use torrentzip::cli::{Command, CreateArgs, VerifyArgs};
use torrentzip::{
    ArchiveAssembler, ArchiveVerifier, Cli, HttpRangeReader, LocalFileReader, ReadAt,
    ZipFileEntry, walk,
};

mod logs;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !logs::from_env()? {
        logs::from_verbosity(cli.verbose);
    }
    debug!(?cli, "got arguments");

    match &cli.command {
        Command::Create(args) => create(args, cli.quiet).await,
        Command::Verify(args) => verify(args, cli.quiet).await,
    }
}

/// Archive every file under the source directory.
///
/// Files are compressed on the rayon pool, then placed in walk order.
async fn create(args: &CreateArgs, quiet: bool) -> Result<()> {
    if !args.force && fs::try_exists(&args.output).await? {
        bail!("{} already exists (use -f to overwrite)", args.output.display());
    }

    let files = walk::collect_files(&args.source)
        .with_context(|| format!("cannot walk {}", args.source.display()))?;
    info!(count = files.len(), "collected input files");

    if !quiet {
        for file in &files {
            println!("  adding: {}", file.name);
        }
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs.unwrap_or(0))
        .build()?;
    let pairs: Vec<(String, PathBuf)> = files.into_iter().map(|f| (f.name, f.path)).collect();

    let assembler = tokio::task::spawn_blocking(move || -> Result<ArchiveAssembler> {
        let mut assembler = ArchiveAssembler::new();
        pool.install(|| assembler.add_files(&pairs))?;
        Ok(assembler)
    })
    .await??;

    let bytes = assembler.finalize();
    fs::write(&args.output, &bytes)
        .await
        .with_context(|| format!("cannot write {}", args.output.display()))?;

    if !quiet {
        let eocd = assembler.end_of_central_directory();
        println!(
            "  created: {} ({} entries, {})",
            args.output.display(),
            assembler.len(),
            format_size(bytes.len() as u64)
        );
        println!("{}", String::from_utf8_lossy(&eocd.comment));
    }

    Ok(())
}

/// Verify a local or remote archive.
async fn verify(args: &VerifyArgs, quiet: bool) -> Result<()> {
    if args.is_http_url() {
        // Remote archives are read through HTTP Range requests
        let reader = Arc::new(HttpRangeReader::new(args.file.clone()).await?);
        let result = check_archive(reader.clone(), args, quiet).await;

        if !quiet {
            eprintln!(
                "\nTotal bytes transferred: {}",
                format_size(reader.transferred_bytes())
            );
        }
        result
    } else {
        let reader = Arc::new(LocalFileReader::new(Path::new(&args.file))?);
        check_archive(reader, args, quiet).await
    }
}

async fn check_archive<R: ReadAt + 'static>(
    reader: Arc<R>,
    args: &VerifyArgs,
    quiet: bool,
) -> Result<()> {
    let verifier = ArchiveVerifier::new(reader);
    let report = verifier.verify().await?;

    if args.list {
        list_files(&report.entries);
    }

    if !quiet {
        for issue in &report.issues {
            println!("  {}: {}", issue.file_name, issue.problem);
        }
        match report.stored_crc {
            Some(stored) if stored != report.computed_crc => println!(
                "  comment records {stored:08X}, central directory is {:08X}",
                report.computed_crc
            ),
            Some(_) => {}
            None => println!("  archive comment is not a TORRENTZIPPED comment"),
        }
    }

    if !report.is_canonical() {
        bail!("{} is not in canonical form", args.file);
    }

    if !quiet {
        println!("{}: OK (TORRENTZIPPED-{:08X})", args.file, report.computed_crc);
    }
    Ok(())
}

/// Print a table of entries with a totals line.
fn list_files(entries: &[ZipFileEntry]) {
    println!(
        "{:>10}  {:>10}  {:>5}  {:>8}  {:>10}  {:>5}  Name",
        "Length", "Size", "Cmpr", "CRC-32", "Date", "Time"
    );
    println!("{}", "-".repeat(80));

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;

    for entry in entries {
        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();

        println!(
            "{:>10}  {:>10}  {}  {:08X}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio(entry.compressed_size as u64, entry.uncompressed_size as u64),
            entry.crc32,
            year,
            month,
            day,
            hour,
            minute,
            entry.file_name
        );

        total_uncompressed += entry.uncompressed_size as u64;
        total_compressed += entry.compressed_size as u64;
    }

    println!("{}", "-".repeat(80));
    println!(
        "{:>10}  {:>10}  {}  {:>31}  {} files",
        total_uncompressed,
        total_compressed,
        ratio(total_compressed, total_uncompressed),
        "",
        entries.len()
    );
}

/// Space saved as a percentage, right-aligned to five columns.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
