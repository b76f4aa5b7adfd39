//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Find e-books by title, download them and send them to your e-reader.
///
/// Without `--csv` or `--title` an interactive menu asks what to fetch.
/// Credentials are read from the environment or a `.env` file.
#[derive(Parser, Debug)]
#[command(name = "book-courier")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// CSV file of requests (`Title` column, optional `Mirror_1..3`)
    #[arg(long, value_name = "PATH", conflicts_with = "title")]
    pub csv: Option<PathBuf>,

    /// Title to search for (repeatable)
    #[arg(short = 't', long, value_name = "TITLE")]
    pub title: Vec<String>,

    /// Explicit mirror page for a single --title
    #[arg(long, value_name = "URL", requires = "title")]
    pub link: Option<String>,

    /// Mail the books folder to the e-reader after the batch
    #[arg(long)]
    pub send: bool,

    /// Clear the books folder after the batch
    #[arg(long)]
    pub clear: bool,

    /// Directory the browser downloads into
    #[arg(long, value_name = "DIR")]
    pub downloads_dir: Option<PathBuf>,

    /// Directory normalized books are collected in
    #[arg(long, value_name = "DIR")]
    pub books_dir: Option<PathBuf>,

    /// Directory for the not-found log
    #[arg(long, value_name = "DIR")]
    pub logs_dir: Option<PathBuf>,

    /// Longest wait for one browser download in seconds (1-3600)
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub download_timeout: Option<u64>,

    /// Chromedriver endpoint
    #[arg(long, value_name = "URL")]
    pub webdriver_url: Option<String>,
}

impl Args {
    /// True when no batch was given on the command line.
    #[must_use]
    pub fn is_interactive(&self) -> bool {
        self.csv.is_none() && self.title.is_empty()
    }
}
