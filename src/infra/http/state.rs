use std::sync::Arc;

use crate::application::intake::IntakeService;
use crate::application::pipeline::ConversionPipeline;
use crate::application::tracker::JobTracker;
use crate::infra::storage::ArtifactStorage;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<JobTracker>,
    pub intake: Arc<IntakeService>,
    pub pipeline: Arc<ConversionPipeline>,
    pub storage: Arc<ArtifactStorage>,
}
