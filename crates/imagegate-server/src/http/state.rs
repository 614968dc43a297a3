use std::sync::Arc;

use crate::dispatch::MailboxRegistry;
use crate::gallery::GalleryStore;
use crate::llm::LlmClient;
use crate::pool::WorkerPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<WorkerPool>,
    pub mailbox: MailboxRegistry,
    pub gallery: Arc<GalleryStore>,
    pub llm: LlmClient,
    pub model_path: String,
    pub max_total_pixels: u64,
}
