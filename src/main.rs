//! Main entry point for the zipfs CLI application.
//!
//! This binary drives the archive filesystem layer from the command line:
//! listing one directory level (or all of it), piping an entry with an
//! optional seek, and extracting whole archives.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use zipfs::vfs::hierarchy::is_shadow_artifact;
use zipfs::zip::{dos_date, dos_time};
use zipfs::{ArchiveFs, ArchiveUrl, Cli, ListingItem, LocalFs};

/// Application entry point.
///
/// The archive layer is blocking, so the request runs on a blocking worker.
/// With `--timeout`, a request that outlives the limit is abandoned: the
/// process exits without waiting for it.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Arc::new(Cli::parse());
    cli.init_logging();

    let host = Arc::new(LocalFs::new());
    let fs = Arc::new(ArchiveFs::new(host.clone()).with_policy(cli.cache_policy()));

    let request = {
        let fs = Arc::clone(&fs);
        let cli = Arc::clone(&cli);
        tokio::task::spawn_blocking(move || process_archive(&fs, &cli))
    };

    let joined = match cli.timeout {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), request).await {
            Ok(joined) => joined,
            Err(_) => {
                eprintln!("zipfs: request timed out after {secs}s");
                // The blocking worker cannot be interrupted; leave it behind
                std::process::exit(2);
            }
        },
        None => request.await,
    };
    joined.context("request worker failed")??;

    if cli.verbose && !cli.is_very_quiet() {
        eprintln!("\nTotal bytes read: {}", format_size(host.bytes_read()));
    }

    Ok(())
}

/// Process an archive based on CLI options.
///
/// - List mode (`-l` or `-v`, optionally `-R`): display directory contents
/// - Pipe mode (`-p`): write selected entries to stdout
/// - Extract mode: extract selected entries below `-d` or the current directory
fn process_archive(fs: &ArchiveFs, cli: &Cli) -> Result<()> {
    let container = cli.file.as_path();

    if cli.list || cli.verbose {
        let dirs: Vec<&str> = if cli.files.is_empty() {
            vec![""]
        } else {
            cli.files.iter().map(String::as_str).collect()
        };
        for (i, dir) in dirs.iter().enumerate() {
            let url = ArchiveUrl::new(container)
                .with_inner(dir)
                .with_options(cli.url_options());
            let items = if cli.recursive {
                list_recursive(fs, &url)?
            } else {
                fs.list_dir(&url)
                    .with_context(|| format!("cannot list {url}"))?
            };
            if dirs.len() > 1 {
                if i > 0 {
                    println!();
                }
                println!("{}:", if dir.is_empty() { "/" } else { *dir });
            }
            print_listing(&items, cli.verbose);
        }
        return Ok(());
    }

    if cli.pipe {
        return pipe_files(fs, cli, container);
    }

    let dest = cli.extract_dir.as_deref().unwrap_or(Path::new("."));
    let summary = fs
        .extractor()
        .extract_archive(container, dest, &cli.extract_options(), |entry| {
            let selected = selects(cli, &entry.file_name);
            if selected && !cli.is_quiet() {
                println!("  extracting: {}", entry.file_name);
            }
            selected
        })
        .with_context(|| format!("cannot extract {}", container.display()))?;

    if !cli.is_quiet() {
        println!(
            "{} files extracted ({}), {} skipped",
            summary.extracted,
            format_size(summary.bytes),
            summary.skipped
        );
    }
    Ok(())
}

/// Every entry below `url`, flat, with full paths as labels
fn list_recursive(fs: &ArchiveFs, url: &ArchiveUrl) -> Result<Vec<ListingItem>> {
    let index = fs.extractor().list_files(url.container())?;
    let prefix = if url.is_root() {
        String::new()
    } else {
        format!("{}/", url.inner())
    };

    Ok(index
        .entries()
        .iter()
        .filter(|e| e.file_name.starts_with(&prefix) && !is_shadow_artifact(&e.file_name))
        .map(|e| {
            let is_dir = e.is_directory();
            ListingItem {
                label: e.file_name.clone(),
                url: ArchiveUrl::new(url.container())
                    .with_inner(&e.file_name)
                    .with_options(url.options()),
                is_dir,
                size: e.uncompressed_size,
                compressed_size: e.compressed_size,
                method: (!is_dir).then_some(e.compression_method),
                dos_time: Some((e.last_mod_date, e.last_mod_time)),
            }
        })
        .collect())
}

/// Print listing items.
///
/// - Simple format (`-l`): just names, directories with a trailing `/`
/// - Verbose format (`-v`): table with size, method, compression ratio and timestamps
fn print_listing(items: &[ListingItem], verbose: bool) {
    if verbose {
        println!(
            "{:>10}  {:>10}  {:<7}  {:>5}  {:>10}  {:>5}  Name",
            "Length", "Size", "Method", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(79));
    }

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for item in items {
        let name = if item.is_dir && !item.label.ends_with('/') {
            format!("{}/", item.label)
        } else {
            item.label.clone()
        };
        if !verbose {
            println!("{name}");
            continue;
        }

        let (date, time) = item
            .dos_time
            .map(|(date, time)| (format_dos_date(date), format_dos_time(time)))
            .unwrap_or_else(|| (" ".repeat(10), " ".repeat(5)));
        let method = item.method.map(|m| m.name()).unwrap_or("");
        println!(
            "{:>10}  {:>10}  {:<7}  {}  {}  {}  {}",
            item.size,
            item.compressed_size,
            method,
            ratio(item.compressed_size, item.size),
            date,
            time,
            name
        );

        if !item.is_dir {
            total_uncompressed += item.size;
            total_compressed += item.compressed_size;
            file_count += 1;
        }
    }

    if verbose {
        println!("{}", "-".repeat(79));
        println!(
            "{:>10}  {:>10}  {:<7}  {}  {:>17}  {} files",
            total_uncompressed,
            total_compressed,
            "",
            ratio(total_compressed, total_uncompressed),
            "",
            file_count
        );
    }
}

/// Write selected entries to stdout, honoring `--offset` and `--length`
fn pipe_files(fs: &ArchiveFs, cli: &Cli, container: &Path) -> Result<()> {
    let index = fs.extractor().list_files(container)?;
    let selected: Vec<_> = index
        .entries()
        .iter()
        .filter(|e| !e.is_directory() && selects(cli, &e.file_name))
        .collect();
    if selected.is_empty() {
        return Err(anyhow!("no matching entries in {}", container.display()));
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let show_filename = selected.len() > 1;
    for entry in selected {
        if show_filename {
            writeln!(out, "--- {} ---", entry.file_name)?;
        }

        let url = ArchiveUrl::new(container)
            .with_inner(&entry.file_name)
            .with_options(cli.url_options());
        let mut stream = fs.open(&url).with_context(|| format!("cannot open {url}"))?;
        if cli.offset > 0 {
            stream.seek(SeekFrom::Start(cli.offset.min(stream.length())))?;
        }
        let limit = cli.length.unwrap_or(u64::MAX);
        io::copy(&mut (&mut stream).take(limit), &mut out)?;
        stream.close();
    }
    out.flush()?;
    Ok(())
}

/// Whether an entry name passes the INNER selection and the `-x` exclusions
fn selects(cli: &Cli, name: &str) -> bool {
    // If specific files are requested, only include entries that match
    if !cli.files.is_empty() {
        let matches = cli.files.iter().any(|f| {
            if has_glob_chars(f) {
                glob_match(f, name)
            } else {
                // No wildcards: exact match on filename or full path
                let basename = name.rsplit('/').next().unwrap_or(name);
                name == f || basename == f
            }
        });
        if !matches {
            return false;
        }
    }

    !cli
        .exclude
        .iter()
        .any(|x| name.contains(x.as_str()) || glob_match(x, name))
}

/// Percentage saved by compression
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

fn format_dos_date(date: u16) -> String {
    let (year, month, day) = dos_date(date);
    format!("{year:04}-{month:02}-{day:02}")
}

fn format_dos_time(time: u16) -> String {
    let (hour, minute, _) = dos_time(time);
    format!("{hour:02}:{minute:02}")
}

/// Check if a pattern contains glob wildcard characters.
fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            // Skip the star, or let it swallow one more character
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globs() {
        assert!(glob_match("*.txt", "readme.txt"));
        assert!(glob_match("file?.dat", "file1.dat"));
        assert!(!glob_match("*.txt", "readme.md"));
    }

    #[test]
    fn selection_and_exclusion() {
        let cli = Cli::parse_from(["zipfs", "a.zip", "b.txt", "docs/*", "-x", "secret"]);
        assert!(selects(&cli, "a/b.txt"));
        assert!(selects(&cli, "docs/readme"));
        assert!(!selects(&cli, "docs/secret.txt"));
        assert!(!selects(&cli, "c.txt"));
    }

    #[test]
    fn dos_fields() {
        // 2024-03-15 13:45
        assert_eq!(format_dos_date((44 << 9) | (3 << 5) | 15), "2024-03-15");
        assert_eq!(format_dos_time((13 << 11) | (45 << 5)), "13:45");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(ratio(25, 100), "  75%");
    }
}
