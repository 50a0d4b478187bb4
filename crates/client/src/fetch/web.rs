//! Browser fetcher built on `XMLHttpRequest`.
//!
//! The request's handlers only push into a shared queue; the future drains it
//! once per frame. Dropping the future aborts the request and detaches them.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use daeview_core::loader::{next_frame, CancelToken, FetchError, Fetcher, Progress};
use js_sys::{ArrayBuffer, Uint8Array};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Event, ProgressEvent, XmlHttpRequest, XmlHttpRequestResponseType};

use super::status_error;

enum XhrEvent {
    Progress(Progress),
    Load,
    Error(&'static str),
}

type EventQueue = Rc<RefCell<VecDeque<XhrEvent>>>;

/// Keeps the handlers alive for the lifetime of the request.
struct PendingRequest {
    xhr: XmlHttpRequest,
    finished: bool,
    _on_progress: Closure<dyn FnMut(ProgressEvent)>,
    _on_load: Closure<dyn FnMut(Event)>,
    _on_error: Closure<dyn FnMut(Event)>,
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.xhr.abort();
            tracing::debug!("aborted model request");
        }
        self.xhr.set_onprogress(None);
        self.xhr.set_onload(None);
        self.xhr.set_onerror(None);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct XhrFetcher;

impl XhrFetcher {
    pub fn new() -> Self {
        Self
    }
}

fn js_error(uri: &str, what: &str, err: JsValue) -> FetchError {
    FetchError::Transport {
        uri: uri.to_string(),
        message: format!("{what}: {err:?}"),
    }
}

fn push(queue: &EventQueue, event: XhrEvent) {
    queue.borrow_mut().push_back(event);
}

fn read_response(uri: &str, xhr: &XmlHttpRequest) -> Result<Vec<u8>, FetchError> {
    let status = xhr
        .status()
        .map_err(|e| js_error(uri, "XMLHttpRequest.status", e))?;
    if status == 0 {
        return Err(FetchError::Transport {
            uri: uri.to_string(),
            message: "request failed".into(),
        });
    }
    if let Some(err) = status_error(uri, status) {
        return Err(err);
    }
    let value = xhr
        .response()
        .map_err(|e| js_error(uri, "XMLHttpRequest.response", e))?;
    if value.is_null() || value.is_undefined() {
        return Ok(Vec::new());
    }
    let buffer = value
        .dyn_into::<ArrayBuffer>()
        .map_err(|e| js_error(uri, "expected ArrayBuffer", e))?;
    Ok(Uint8Array::new(&buffer).to_vec())
}

impl Fetcher for XhrFetcher {
    async fn fetch(
        &self,
        uri: &str,
        progress: &mut dyn FnMut(Progress),
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, FetchError> {
        let queue: EventQueue = Rc::default();

        let xhr = XmlHttpRequest::new().map_err(|e| js_error(uri, "XMLHttpRequest", e))?;
        xhr.open_with_async("GET", uri, true)
            .map_err(|e| js_error(uri, "XMLHttpRequest.open", e))?;
        xhr.set_response_type(XmlHttpRequestResponseType::Arraybuffer);

        let on_progress = {
            let queue = queue.clone();
            Closure::<dyn FnMut(ProgressEvent)>::new(move |event: ProgressEvent| {
                push(
                    &queue,
                    XhrEvent::Progress(Progress {
                        loaded: event.loaded() as u64,
                        total: event.length_computable().then(|| event.total() as u64),
                    }),
                );
            })
        };
        let on_load = {
            let queue = queue.clone();
            Closure::<dyn FnMut(Event)>::new(move |_: Event| push(&queue, XhrEvent::Load))
        };
        let on_error = {
            let queue = queue.clone();
            Closure::<dyn FnMut(Event)>::new(move |_: Event| {
                push(&queue, XhrEvent::Error("network error"))
            })
        };
        xhr.set_onprogress(Some(on_progress.as_ref().unchecked_ref()));
        xhr.set_onload(Some(on_load.as_ref().unchecked_ref()));
        xhr.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        let mut request = PendingRequest {
            xhr,
            finished: false,
            _on_progress: on_progress,
            _on_load: on_load,
            _on_error: on_error,
        };
        request
            .xhr
            .send()
            .map_err(|e| js_error(uri, "XMLHttpRequest.send", e))?;

        loop {
            loop {
                let event = queue.borrow_mut().pop_front();
                match event {
                    Some(XhrEvent::Progress(p)) => progress(p),
                    Some(XhrEvent::Load) => {
                        request.finished = true;
                        return read_response(uri, &request.xhr);
                    }
                    Some(XhrEvent::Error(message)) => {
                        request.finished = true;
                        return Err(FetchError::Transport {
                            uri: uri.to_string(),
                            message: message.into(),
                        });
                    }
                    None => break,
                }
            }
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            next_frame().await;
        }
    }
}
