//! Media library storage: metadata stores, on-disk layout, hash loading and
//! library-wide duplicate calculation.

pub mod duplicates;
pub mod error;
pub mod fs_store;
pub mod media_library;
pub mod memory_store;
pub mod models;
pub mod store;

pub use error::StoreError;
pub use media_library::MediaLibrary;
pub use models::MediaEntry;
pub use store::{MetadataLookup, MetadataStore};
