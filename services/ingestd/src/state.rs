use crate::pipeline::IngestPipeline;
use crate::store::IngestStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    pub store: Arc<dyn IngestStore>,
}

impl AppState {
    pub fn new(pipeline: Arc<IngestPipeline>, store: Arc<dyn IngestStore>) -> Self {
        Self { pipeline, store }
    }
}
