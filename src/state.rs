use std::sync::Arc;
use std::time::Duration;

use crate::fetcher::Fetcher;
use crate::ffmpeg::MediaTool;
use crate::scratch::ScratchDir;

/// Per-process dependencies injected into every workflow.
#[derive(Clone)]
pub struct AppState {
    pub scratch: ScratchDir,
    pub fetcher: Fetcher,
    pub tool: Arc<dyn MediaTool>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(
        scratch: ScratchDir,
        fetcher: Fetcher,
        tool: Arc<dyn MediaTool>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            scratch,
            fetcher,
            tool,
            request_timeout,
        }
    }
}
