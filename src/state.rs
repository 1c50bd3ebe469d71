use std::sync::Arc;

use crate::background::JobQueue;
use crate::bus::EventBus;
use crate::config::Config;
use crate::domain::ports::{SlotRepository, UserRepository};
use crate::domain::services::coordinator::BookingCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub slot_repo: Arc<dyn SlotRepository>,
    pub user_repo: Arc<dyn UserRepository>,
    pub coordinator: Arc<BookingCoordinator>,
    pub queue: Arc<JobQueue>,
    pub bus: Arc<EventBus>,
}
