// ezsync-api: Async HTTP client for Wi-Fi SD card directory listings and downloads

pub mod client;
pub mod error;
pub mod listing;
pub mod transport;

pub use client::ListingClient;
pub use error::Error;
pub use listing::{DirectoryListing, IgnoreList, RemoteDir, RemoteEntry, RemoteFile};
pub use transport::{RetryPolicy, TransportConfig};
