//! Token stream reader
//!
//! Owns the model's fragment stream for one response. Yields text fragments as
//! they arrive and exactly one [`Fragment::End`], after which the stream has
//! already been dropped and its connection released. Dropping the reader early
//! releases it too.

use futures::StreamExt;
use termi_llm::FragmentStream;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    /// `error` is set when the transport failed before the response completed
    End { error: Option<String> },
}

pub struct TokenStreamReader {
    inner: Option<FragmentStream>,
    fragments: usize,
}

impl TokenStreamReader {
    pub fn new(stream: FragmentStream) -> Self {
        Self {
            inner: Some(stream),
            fragments: 0,
        }
    }

    /// Next fragment; `None` once the end marker has been handed out
    pub async fn next(&mut self) -> Option<Fragment> {
        loop {
            let stream = self.inner.as_mut()?;
            let item = stream.next().await;
            match item {
                Some(Ok(text)) if text.is_empty() => continue,
                Some(Ok(text)) => {
                    self.fragments += 1;
                    return Some(Fragment::Text(text));
                }
                Some(Err(e)) => {
                    debug!(fragments = self.fragments, error = %e, "Stream failed");
                    self.release();
                    return Some(Fragment::End {
                        error: Some(e.to_string()),
                    });
                }
                None => {
                    debug!(fragments = self.fragments, "Stream complete");
                    self.release();
                    return Some(Fragment::End { error: None });
                }
            }
        }
    }

    /// Drop the underlying stream now, e.g. when abandoning it for a tool call
    pub fn release(&mut self) {
        if self.inner.take().is_some() {
            debug!(fragments = self.fragments, "Released model stream");
        }
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    /// Text fragments delivered so far
    pub fn fragment_count(&self) -> usize {
        self.fragments
    }
}

impl std::fmt::Debug for TokenStreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStreamReader")
            .field("released", &self.is_released())
            .field("fragments", &self.fragments)
            .finish()
    }
}
