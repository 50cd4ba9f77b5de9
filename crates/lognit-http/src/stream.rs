//! Lazy decoding of newline-delimited JSON response bodies.

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use lognit::ServerError;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Single-pass sequence of items decoded from a streamed response body.
///
/// Each non-blank line of the body is one JSON document. The body is pulled
/// chunk by chunk as items are requested, never buffered whole.
pub struct RestStream<T> {
    body: BoxStream<'static, Result<Vec<u8>, ServerError>>,
    buffer: Vec<u8>,
    exhausted: bool,
    failed: bool,
    _item: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for RestStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStream")
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.exhausted)
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

impl<T: DeserializeOwned> RestStream<T> {
    pub(crate) fn from_response(response: reqwest::Response) -> Self {
        let context = response.url().to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| ServerError::from_transport_error(e, &context))
            })
            .boxed();
        Self::from_body(body)
    }

    pub(crate) fn from_body(body: BoxStream<'static, Result<Vec<u8>, ServerError>>) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            exhausted: false,
            failed: false,
            _item: PhantomData,
        }
    }

    pub fn empty() -> Self {
        Self::from_body(futures_util::stream::empty().boxed())
    }

    /// Next decoded item, `None` once the body is consumed.
    ///
    /// After an `Err` item the stream is finished.
    pub async fn next(&mut self) -> Option<Result<T, ServerError>> {
        if self.failed {
            return None;
        }

        loop {
            if let Some(line) = self.take_line() {
                return Some(self.decode(&line));
            }

            if self.exhausted {
                return None;
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(e));
                }
                None => self.exhausted = true,
            }
        }
    }

    /// Drain the remaining items into a vector, stopping at the first error.
    pub async fn collect_all(mut self) -> Result<Vec<T>, ServerError> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item?);
        }
        Ok(items)
    }

    /// Pop the next non-blank line; the trailing partial line only counts
    /// once the body is exhausted.
    fn take_line(&mut self) -> Option<Vec<u8>> {
        loop {
            let line = match self.buffer.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                    line.pop();
                    line
                }
                None if self.exhausted && !self.buffer.is_empty() => std::mem::take(&mut self.buffer),
                None => return None,
            };

            if !line.iter().all(u8::is_ascii_whitespace) {
                return Some(line);
            }
        }
    }

    fn decode(&mut self, line: &[u8]) -> Result<T, ServerError> {
        serde_json::from_slice(line).map_err(|e| {
            self.failed = true;
            ServerError::from_decode_error(e, "streamed item")
        })
    }
}
