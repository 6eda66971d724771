pub mod cell_store;
pub mod save;
pub mod undo;

pub use cell_store::{AppState, CellStore, CellUpdate, StoreError, StoreEvent, StoreOptions};
pub use save::{InlineSaveChannel, SaveChannel, SaveStatus, WorkerSaveChannel};
pub use undo::UndoManager;
