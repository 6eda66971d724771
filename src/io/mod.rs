pub mod config_io;
pub mod document_io;
pub mod lock;
pub mod recovery;
pub mod watcher;
