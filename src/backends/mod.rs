//! Concrete `ResourceBackend` implementations.

mod cache;
mod local;
mod memory;
mod vault;

pub use cache::MemoryCache;
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use vault::JsonVault;
