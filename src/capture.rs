use crate::error::StampError;
use crate::pdf::{self, PageSize};
use chrono::{Local, NaiveDateTime};
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use url::Url;

/// Margin Chromium leaves around the printed page, which keeps the stamped
/// header clear of the page content.
const MARGIN_INCHES: f64 = 0.75;

/// Longest time spent waiting for images before printing anyway.
const IMAGE_WAIT: Duration = Duration::from_secs(15);

/// Slack on top of the longest quiet period we cause ourselves before the
/// browser connection counts as idle.
const IDLE_MARGIN: Duration = Duration::from_secs(30);

/// Script resolving once every `<img>` on the page has either loaded or
/// failed, or after `limit` has passed, whichever comes first.
fn wait_for_images_script(limit: Duration) -> String {
    format!(
        r#"
new Promise((resolve) => {{
    const images = Array.from(document.querySelectorAll('img')).filter((img) => !img.complete);
    let pending = images.length;
    if (pending === 0) {{
        resolve(true);
        return;
    }}
    setTimeout(() => resolve(false), {limit_ms});
    const done = () => {{
        pending -= 1;
        if (pending === 0) resolve(true);
    }};
    images.forEach((img) => {{
        img.addEventListener('load', done, {{ once: true }});
        img.addEventListener('error', done, {{ once: true }});
    }});
}})
"#,
        limit_ms = limit.as_millis()
    )
}

/// A URL as given on the command line. The literal text is what gets
/// stamped; the parsed form is what the browser navigates to.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetUrl {
    raw: String,
    parsed: Url,
}

impl TargetUrl {
    pub fn as_typed(&self) -> &str {
        &self.raw
    }

    pub fn url(&self) -> &Url {
        &self.parsed
    }
}

impl FromStr for TargetUrl {
    type Err = url::ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(TargetUrl {
            raw: raw.to_string(),
            parsed: Url::parse(raw)?,
        })
    }
}

impl fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub url: Url,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl CaptureRequest {
    /// Paper size requested from the browser for this viewport.
    pub fn paper_size(&self) -> PageSize {
        PageSize::from_viewport(self.viewport_width, self.viewport_height)
    }
}

/// The browser's PDF export of a page, together with the size of its first
/// page and the moment the page finished loading.
#[derive(Debug, Clone)]
pub struct CapturedDocument {
    pub pdf: Vec<u8>,
    pub page_size: PageSize,
    pub fetched_at: NaiveDateTime,
}

/// Loads a URL and exports it as PDF.
pub trait PageLoader {
    fn load(&self, request: &CaptureRequest) -> Result<CapturedDocument, StampError>;
}

/// Drives a headless Chromium instance. A fresh browser is launched for every
/// `load` call and shut down when the call returns.
#[derive(Debug, Clone)]
pub struct ChromeLoader {
    pub navigation_timeout: Duration,
    pub settle: Duration,
}

impl ChromeLoader {
    /// Time allowed for images to finish loading after the settle wait.
    pub fn image_wait(&self) -> Duration {
        self.navigation_timeout.min(IMAGE_WAIT)
    }

    /// The browser connection sees no traffic while we sleep through the
    /// settle period and while the image and print calls are pending, so the
    /// idle limit has to outlast all of them.
    pub fn idle_timeout(&self) -> Duration {
        self.navigation_timeout * 2 + self.settle + self.image_wait() + IDLE_MARGIN
    }

    pub fn launch_options(&self, request: &CaptureRequest) -> LaunchOptions<'static> {
        LaunchOptions {
            headless: true,
            window_size: Some((request.viewport_width, request.viewport_height)),
            idle_browser_timeout: self.idle_timeout(),
            ..Default::default()
        }
    }

    fn launch(&self, request: &CaptureRequest) -> Result<Browser, StampError> {
        Browser::new(self.launch_options(request))
            .map_err(|err| StampError::BrowserLaunch(err.into()))
    }
}

impl PageLoader for ChromeLoader {
    fn load(&self, request: &CaptureRequest) -> Result<CapturedDocument, StampError> {
        let url = request.url.as_str();
        // Dropping the browser kills the Chromium process, so every early
        // return below also tears it down.
        let browser = self.launch(request)?;

        let tab = browser
            .new_tab()
            .map_err(|err| StampError::BrowserLaunch(err.into()))?;
        tab.set_default_timeout(self.navigation_timeout);

        tracing::info!("Navigating to {url}...");
        let started = Instant::now();
        tab.navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|err| StampError::navigation(url, err))?;
        let fetched_at = Local::now().naive_local();
        tracing::debug!("navigation finished after {:?}", started.elapsed());

        std::thread::sleep(self.settle);

        tracing::info!("Waiting for images to load...");
        match tab.evaluate(&wait_for_images_script(self.image_wait()), true) {
            Ok(result) if result.value.as_ref().and_then(|value| value.as_bool()) == Some(false) => {
                tracing::warn!(
                    "images still loading after {:?}, continuing anyway",
                    self.image_wait()
                );
            }
            Ok(_) => {}
            Err(err) => tracing::warn!("waiting for images failed, continuing anyway: {err}"),
        }

        tracing::info!("Generating PDF...");
        let paper = request.paper_size();
        let options = PrintToPdfOptions {
            print_background: Some(true),
            display_header_footer: Some(false),
            paper_width: Some(paper.width_inches()),
            paper_height: Some(paper.height_inches()),
            margin_top: Some(MARGIN_INCHES),
            margin_bottom: Some(MARGIN_INCHES),
            margin_left: Some(MARGIN_INCHES),
            margin_right: Some(MARGIN_INCHES),
            ..Default::default()
        };
        let pdf_bytes = tab
            .print_to_pdf(Some(options))
            .map_err(StampError::render)?;
        tracing::debug!("browser produced {} bytes of PDF", pdf_bytes.len());

        let page_size = pdf::first_page_size(&pdf_bytes).unwrap_or_else(|| {
            tracing::debug!("could not read the first page size, assuming {paper:?}");
            paper
        });

        Ok(CapturedDocument {
            pdf: pdf_bytes,
            page_size,
            fetched_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLoader, UnreachableLoader};

    fn request(url: &str) -> CaptureRequest {
        CaptureRequest {
            url: Url::parse(url).unwrap(),
            viewport_width: 1280,
            viewport_height: 800,
        }
    }

    #[test]
    fn test_target_url_keeps_typed_text() {
        let target: TargetUrl = "https://Bücher.example/A B".parse().unwrap();
        assert_eq!(target.as_typed(), "https://Bücher.example/A B");
        assert_eq!(target.to_string(), "https://Bücher.example/A B");
        assert_eq!(target.url().as_str(), "https://xn--bcher-kva.example/A%20B");
        assert_eq!(target.url().host_str(), Some("xn--bcher-kva.example"));

        assert!("not a url".parse::<TargetUrl>().is_err());
    }

    #[test]
    fn test_paper_size_follows_viewport() {
        assert_eq!(
            request("https://example.com").paper_size(),
            PageSize::new(960.0, 600.0)
        );
    }

    #[test]
    fn test_idle_timeout_outlasts_quiet_periods() {
        for (timeout, settle) in [(60, 3_000), (60, 120_000), (5, 0), (300, 10_000)] {
            let loader = ChromeLoader {
                navigation_timeout: Duration::from_secs(timeout),
                settle: Duration::from_millis(settle),
            };
            let options = loader.launch_options(&request("https://example.com/"));

            assert!(options.headless);
            assert_eq!(options.window_size, Some((1280, 800)));
            assert!(loader.image_wait() <= IMAGE_WAIT);
            assert!(loader.image_wait() <= loader.navigation_timeout);
            // Settle sleep, then the image wait, then a print call that may
            // take up to the tab timeout, all without browser events.
            let quiet = loader.settle + loader.image_wait() + loader.navigation_timeout;
            assert!(options.idle_browser_timeout > quiet, "{timeout}s / {settle}ms");
            assert!(options.idle_browser_timeout > loader.settle + loader.navigation_timeout);
        }
    }

    #[test]
    fn test_image_wait_script_is_bounded() {
        let script = wait_for_images_script(Duration::from_secs(15));
        assert!(script.contains("setTimeout(() => resolve(false), 15000)"));
        assert!(script.trim_start().starts_with("new Promise("));
    }

    #[test]
    fn test_loaders_are_interchangeable() {
        let loaders: Vec<Box<dyn PageLoader>> = vec![
            Box::new(FakeLoader {
                pages: vec![(960.0, 600.0)],
            }),
            Box::new(UnreachableLoader),
        ];
        let results = loaders
            .iter()
            .map(|loader| loader.load(&request("https://example.com/page")))
            .collect::<Vec<_>>();

        let captured = results[0].as_ref().unwrap();
        assert_eq!(captured.page_size, PageSize::new(960.0, 600.0));
        assert_eq!(pdf::first_page_size(&captured.pdf), Some(captured.page_size));

        let err = results[1].as_ref().unwrap_err();
        assert!(matches!(err, StampError::Navigation { .. }));
        assert_eq!(
            err.to_string(),
            "navigation to https://example.com/page failed"
        );
    }
}
