//! # dr-dispatch
//!
//! Ordered, transactional dispatch of the files announced by a notification
//! message.
//!
//! [`NotificationMessageHandler::handle_file`] parses a staged message,
//! relocates its files, routes each file to a [`DispatcherWrapper`] through the
//! [`DispatcherWrapperFactory`], then runs the wrappers in
//! [`dr_core::DISPATCHER_ORDERING`] inside one store transaction.

pub mod blob;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod factory;
pub mod handler;
pub mod store;
pub mod wrapper;

pub use blob::{BlobRef, BlobStore, DirBlobStore};
pub use dispatcher::{
    ArchiveDispatcher, Dispatcher, DispatcherProvider, FileSink, ModelImporter, NoModelImport,
    StandardDispatchers,
};
pub use error::{DispatchError, StoreError};
pub use events::{
    EventLogPublisher, EventPhase, LogPublisher, NotificationMessageEvent, StatusPublisher,
};
pub use factory::DispatcherWrapperFactory;
pub use handler::NotificationMessageHandler;
pub use store::{JsonStore, MemoryStore, ReceiptStore, StoreSnapshot};
pub use wrapper::{DispatchContext, DispatcherWrapper};
