pub mod config;
pub mod document_store;
pub mod object_store;
pub mod server;
