//! Domain logic shared by the downloader, the library and the worker binary.

pub mod dhash;
pub mod duplicates;
pub mod error;
pub mod ffmpeg;
pub mod frames;
pub mod hash_store;
pub mod hashing;
pub mod jpeg_splitter;
pub mod media_tool;
pub mod types;
