//! Platform [`Fetcher`](daeview_core::loader::Fetcher) implementations.
//!
//! On WASM: `XMLHttpRequest` with an `arraybuffer` response.
//! On native: local files or `http(s)://` URLs, read on a helper thread.

#[cfg(not(target_arch = "wasm32"))]
mod native;

#[cfg(not(target_arch = "wasm32"))]
pub use native::NativeFetcher;

#[cfg(target_arch = "wasm32")]
mod web;

#[cfg(target_arch = "wasm32")]
pub use web::XhrFetcher;

use daeview_core::loader::FetchError;

/// Map an HTTP status to a fetch error. `None` means success.
pub fn status_error(uri: &str, status: u16) -> Option<FetchError> {
    match status {
        200..=299 => None,
        404 => Some(FetchError::NotFound {
            uri: uri.to_string(),
        }),
        status => Some(FetchError::Status {
            uri: uri.to_string(),
            status,
        }),
    }
}
