pub mod cache;

pub use cache::{ProfileCache, SharedCache, record_digest};
