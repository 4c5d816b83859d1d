use std::path::PathBuf;

use clap::Parser;
use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::zip::{CachePolicy, DEFAULT_CACHE_THRESHOLD, ExtractOptions, Overwrite};

#[derive(Parser, Debug, Clone)]
#[command(name = "zipfs")]
#[command(version)]
#[command(about = "Browse and stream ZIP archives as a virtual filesystem", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipfs -l media.zip extras             list one directory level inside media.zip\n  \
  zipfs -lR media.zip                   list every entry\n  \
  zipfs -p docs.zip about.txt --offset 100 --length 20\n                                        \
  print 20 bytes of about.txt starting at byte 100\n  \
  zipfs data1.zip -x joe -d out         extract all files except joe into out/")]
pub struct Cli {
    /// ZIP file path
    #[arg(value_name = "ARCHIVE")]
    pub file: PathBuf,

    /// Paths inside the archive (directories for -l, files otherwise; default: all)
    #[arg(value_name = "INNER")]
    pub files: Vec<String>,

    /// List one directory level (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely
    #[arg(short = 'v')]
    pub verbose: bool,

    /// List every entry below the directory instead of one level
    #[arg(short = 'R')]
    pub recursive: bool,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Start piping at this uncompressed byte offset
    #[arg(long, value_name = "BYTES", default_value_t = 0, requires = "pipe")]
    pub offset: u64,

    /// Pipe at most this many bytes
    #[arg(long, value_name = "BYTES", requires = "pipe")]
    pub length: Option<u64>,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<PathBuf>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n', conflicts_with = "overwrite")]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Always inflate live, never through a scratch copy
    #[arg(long)]
    pub no_cache: bool,

    /// Deflate entries larger than this are extracted to a scratch file first
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_CACHE_THRESHOLD)]
    pub cache_threshold: u64,

    /// Directory for scratch copies
    #[arg(long, value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Give up on a request after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Log diagnostics to stderr (twice for trace)
    #[arg(long, action = clap::ArgAction::Count)]
    pub debug: u8,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    pub fn cache_policy(&self) -> CachePolicy {
        let mut policy = CachePolicy::new()
            .enabled(!self.no_cache)
            .threshold(self.cache_threshold);
        if let Some(dir) = &self.scratch_dir {
            policy = policy.scratch_dir(dir);
        }
        policy
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            junk_paths: self.junk_paths,
            overwrite: if self.overwrite {
                Overwrite::Always
            } else {
                Overwrite::Skip
            },
        }
    }

    /// Query options carried on every URL the CLI builds
    pub fn url_options(&self) -> &'static str {
        if self.no_cache { "cache=no" } else { "" }
    }

    pub fn log_level(&self) -> LevelFilter {
        match (self.debug, self.is_very_quiet()) {
            (0, true) => LevelFilter::Off,
            (0, false) => LevelFilter::Warn,
            (1, _) => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// Install the stderr logger; later calls are ignored
    pub fn init_logging(&self) {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(self.log_level());
        }
    }
}

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match record.level() {
            Level::Warn | Level::Error => {
                eprintln!("zipfs: {}: {}", record.level().as_str().to_lowercase(), record.args())
            }
            _ => eprintln!("[{} {}] {}", record.level(), record.target(), record.args()),
        }
    }

    fn flush(&self) {}
}
