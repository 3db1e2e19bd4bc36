use std::path::PathBuf;

/// Boxed cause used for failures reported by the browser layer.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A fatal failure of one pipeline stage. Nothing is retried and no output
/// file exists once one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum StampError {
    #[error("failed to start the headless browser")]
    BrowserLaunch(#[source] BoxError),

    #[error("navigation to {url} failed")]
    Navigation {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to render the page as PDF")]
    Render(#[source] BoxError),

    #[error("failed to generate the header overlay: {0}")]
    OverlayGeneration(String),

    #[error("captured document has no pages to stamp")]
    EmptyDocument,

    #[error("failed to merge the header onto page {page}")]
    Merge {
        page: u32,
        #[source]
        source: lopdf::Error,
    },

    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StampError {
    pub fn render(source: impl Into<BoxError>) -> Self {
        StampError::Render(source.into())
    }

    pub fn navigation(url: &str, source: impl Into<BoxError>) -> Self {
        StampError::Navigation {
            url: url.to_string(),
            source: source.into(),
        }
    }
}
