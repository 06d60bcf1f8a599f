//! Business logic services

pub mod chats;
pub mod registry;

use std::sync::Arc;

use crate::repository::Repository;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub chats: chats::ChatService,
    pub registry: Arc<registry::SessionRegistry>,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository) -> Self {
        let registry = Arc::new(registry::SessionRegistry::new(Arc::new(repository.clone())));
        Self {
            chats: chats::ChatService::new(repository),
            registry,
        }
    }
}
