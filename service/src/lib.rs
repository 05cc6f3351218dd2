use config::Config;
use events::EventPublisher;
use log::info;
use sse::domain_event_handler::StreamDomainEventHandler;
use sse::Manager;
use std::sync::Arc;

pub mod config;
pub mod logging;

// Service-level state containing only infrastructure concerns
// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sse_manager: Arc<Manager>,
    pub event_publisher: EventPublisher,
}

impl AppState {
    /// Wire the event pipeline: published domain events flow through the
    /// stream handler into the connection registry.
    pub fn new(config: Config) -> Self {
        let sse_manager = Arc::new(Manager::new());
        let event_publisher = EventPublisher::new().with_handler(Arc::new(
            StreamDomainEventHandler::new(sse_manager.clone()),
        ));
        info!("Event pipeline wired to the stream manager");

        Self {
            config,
            sse_manager,
            event_publisher,
        }
    }
}
