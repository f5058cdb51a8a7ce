//! Command dispatch

mod dispatcher;

pub use dispatcher::Dispatcher;
