pub mod backend;
pub mod conversation_service;
pub mod registry_service;
pub mod session_store;
pub mod settings_service;
