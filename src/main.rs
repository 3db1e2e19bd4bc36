use crate::capture::{CaptureRequest, ChromeLoader, PageLoader, TargetUrl};
use crate::error::StampError;
use crate::merge::MergeOptions;
use std::path::PathBuf;
use std::time::Duration;

mod capture;
mod error;
mod logging;
mod merge;
mod output;
mod overlay;
mod pdf;
#[cfg(test)]
mod testing;

/// Save a web page as PDF, stamped with its URL and the time it was fetched.
#[derive(Debug, clap::Parser)]
#[command(version, about, disable_help_flag = true)]
struct Options {
    /// Page to capture
    url: TargetUrl,
    /// Destination file [default: <domain>_<YYYYMMDD_HHMMSS>.pdf]
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Viewport width in pixels
    #[arg(short, long, default_value_t = 1280, value_parser = viewport_size())]
    width: u32,
    /// Viewport height in pixels
    #[arg(short = 'h', long, default_value_t = 800, value_parser = viewport_size())]
    height: u32,
    /// Navigation timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,
    /// Extra time to let the page settle after loading, in milliseconds
    #[arg(long, default_value_t = 3000)]
    settle_ms: u64,
    /// Print "Page N of M" in the bottom-right corner of every page
    #[arg(long)]
    page_numbers: bool,
    /// Increase log verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

fn viewport_size() -> clap::builder::RangedI64ValueParser<u32> {
    clap::value_parser!(u32).range(1..=16384)
}

impl Options {
    fn capture_request(&self) -> CaptureRequest {
        CaptureRequest {
            url: self.url.url().clone(),
            viewport_width: self.width,
            viewport_height: self.height,
        }
    }

    fn loader(&self) -> ChromeLoader {
        ChromeLoader {
            navigation_timeout: Duration::from_secs(self.timeout),
            settle: Duration::from_millis(self.settle_ms),
        }
    }
}

/// Capture, stamp, write. Returns the path of the written file.
fn run(opts: &Options, loader: &dyn PageLoader) -> Result<PathBuf, StampError> {
    tracing::info!("Capturing webpage: {}", opts.url);
    let captured = loader.load(&opts.capture_request())?;
    tracing::debug!(
        "captured {} bytes, first page {} x {} pt",
        captured.pdf.len(),
        captured.page_size.width,
        captured.page_size.height
    );

    tracing::info!("Adding headers...");
    let text = overlay::header_text(opts.url.as_typed(), &captured.fetched_at);
    let header = overlay::render_header_page(&text, captured.page_size)?;
    let stamped = merge::merge_overlay(
        &captured.pdf,
        &header,
        MergeOptions {
            page_numbers: opts.page_numbers,
        },
    )?;

    let path = opts
        .output
        .clone()
        .unwrap_or_else(|| output::default_output_path(opts.url.url(), &captured.fetched_at));
    output::write_output(&path, &stamped.pdf)?;
    tracing::debug!("{} page(s) written", stamped.page_count);
    Ok(path)
}

fn main() -> anyhow::Result<()> {
    let opts: Options = clap::Parser::parse();
    logging::init_logging(opts.verbose)?;

    let path = run(&opts, &opts.loader())?;
    println!("PDF saved to: {}", path.display());
    Ok(())
}
