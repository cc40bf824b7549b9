pub mod decode;
pub mod fetch;

pub use decode::{Resample, decode_cover};
pub use fetch::{ArtworkFetcher, ArtworkLoader, HttpFetcher};
