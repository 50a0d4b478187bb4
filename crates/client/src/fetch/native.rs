//! Native fetcher: blocking file or HTTP reads on a helper thread.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::sync::mpsc::{self, TryRecvError};
use std::thread;

use daeview_core::loader::{next_frame, CancelToken, FetchError, Fetcher, Progress};

use super::status_error;

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
/// Upper bound on the buffer reserved from a declared length.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

enum Message {
    Progress(Progress),
    Done(Result<Vec<u8>, FetchError>),
}

/// Reads local paths (optionally `file://`) and `http(s)://` URLs.
#[derive(Debug, Clone)]
pub struct NativeFetcher {
    chunk_size: usize,
}

impl Default for NativeFetcher {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl NativeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl Fetcher for NativeFetcher {
    async fn fetch(
        &self,
        uri: &str,
        progress: &mut dyn FnMut(Progress),
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, FetchError> {
        let (tx, rx) = mpsc::channel();
        let worker_uri = uri.to_string();
        let worker_cancel = cancel.clone();
        let chunk_size = self.chunk_size;

        thread::Builder::new()
            .name("daeview-fetch".into())
            .spawn(move || {
                let result = read_uri(&worker_uri, chunk_size, &worker_cancel, &mut |p| {
                    let _ = tx.send(Message::Progress(p));
                });
                let _ = tx.send(Message::Done(result));
            })
            .map_err(|e| FetchError::Transport {
                uri: uri.to_string(),
                message: e.to_string(),
            })?;

        loop {
            loop {
                match rx.try_recv() {
                    Ok(Message::Progress(p)) => progress(p),
                    Ok(Message::Done(result)) => return result,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        return Err(FetchError::Transport {
                            uri: uri.to_string(),
                            message: "fetch thread exited without a result".into(),
                        })
                    }
                }
            }
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            next_frame().await;
        }
    }
}

fn is_http(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

fn read_uri(
    uri: &str,
    chunk_size: usize,
    cancel: &CancelToken,
    progress: &mut dyn FnMut(Progress),
) -> Result<Vec<u8>, FetchError> {
    if is_http(uri) {
        read_http(uri, chunk_size, cancel, progress)
    } else {
        read_file(uri, chunk_size, cancel, progress)
    }
}

fn read_file(
    uri: &str,
    chunk_size: usize,
    cancel: &CancelToken,
    progress: &mut dyn FnMut(Progress),
) -> Result<Vec<u8>, FetchError> {
    let path = uri.strip_prefix("file://").unwrap_or(uri);
    let mut file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => FetchError::NotFound {
            uri: uri.to_string(),
        },
        _ => transport(uri, e),
    })?;
    let total = file.metadata().ok().map(|m| m.len());
    tracing::debug!(path, ?total, "reading model file");
    read_chunks(uri, &mut file, total, chunk_size, cancel, progress)
}

fn read_http(
    uri: &str,
    chunk_size: usize,
    cancel: &CancelToken,
    progress: &mut dyn FnMut(Progress),
) -> Result<Vec<u8>, FetchError> {
    let mut response = reqwest::blocking::get(uri).map_err(|e| transport(uri, e))?;
    if let Some(err) = status_error(uri, response.status().as_u16()) {
        return Err(err);
    }
    let total = response.content_length();
    tracing::debug!(uri, ?total, "downloading model");
    read_chunks(uri, &mut response, total, chunk_size, cancel, progress)
}

/// Read to the end in `chunk_size` pieces, checking `cancel` between pieces.
fn read_chunks(
    uri: &str,
    reader: &mut impl Read,
    total: Option<u64>,
    chunk_size: usize,
    cancel: &CancelToken,
    progress: &mut dyn FnMut(Progress),
) -> Result<Vec<u8>, FetchError> {
    let mut bytes = Vec::with_capacity(prealloc_hint(total));
    let mut chunk = vec![0u8; chunk_size];
    loop {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(transport(uri, e)),
        };
        bytes.extend_from_slice(&chunk[..read]);
        progress(Progress {
            loaded: bytes.len() as u64,
            total,
        });
    }
    Ok(bytes)
}

/// Capacity to reserve for a body whose declared length is `total`.
fn prealloc_hint(total: Option<u64>) -> usize {
    total
        .map(|t| t.min(MAX_PREALLOC))
        .and_then(|t| usize::try_from(t).ok())
        .unwrap_or(0)
}

fn transport(uri: &str, err: impl std::fmt::Display) -> FetchError {
    FetchError::Transport {
        uri: uri.to_string(),
        message: err.to_string(),
    }
}
