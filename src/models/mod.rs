pub mod provider;
pub mod query;
pub mod results;
pub mod session;
pub mod settings;
pub mod transcript;
