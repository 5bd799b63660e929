pub mod async_loader;
pub mod event_bus;

pub use async_loader::*;
pub use event_bus::*;

/// Boxed future that can be sent between threads.
pub type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
