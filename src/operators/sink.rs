//! The per-element sink handed to `handle` callbacks.

use crate::error::{BoxError, FlowError};
use crate::protocol::{complete_dropped, error_dropped, next_dropped};

/// Terminal requested by a handler.
#[derive(Debug)]
pub(crate) enum Terminal {
    Complete,
    Error(FlowError),
}

/// Collects what a handler did with one input element.
///
/// A fresh sink is built for every element. At most one `next` is allowed
/// per element; a second call terminates the stream with
/// [`FlowError::MultipleEmission`]. `complete` and `error` end the stream
/// after any value already emitted for this element.
#[derive(Debug)]
pub struct SynchronousSink<R> {
    value: Option<R>,
    terminal: Option<Terminal>,
}

impl<R> SynchronousSink<R> {
    pub(crate) fn new() -> Self {
        Self {
            value: None,
            terminal: None,
        }
    }

    /// Emit the transformed value for this element.
    pub fn next(&mut self, value: R) {
        if self.terminal.is_some() {
            next_dropped();
            return;
        }
        if self.value.is_some() {
            self.terminal = Some(Terminal::Error(FlowError::MultipleEmission));
            return;
        }
        self.value = Some(value);
    }

    /// End the stream successfully.
    pub fn complete(&mut self) {
        if self.terminal.is_some() {
            complete_dropped();
            return;
        }
        self.terminal = Some(Terminal::Complete);
    }

    /// End the stream with `cause`.
    pub fn error(&mut self, cause: impl Into<BoxError>) {
        let error = FlowError::signalled(cause);
        if self.terminal.is_some() {
            error_dropped(&error);
            return;
        }
        self.terminal = Some(Terminal::Error(error));
    }

    /// Whether `complete` or `error` was already called for this element.
    pub fn is_terminated(&self) -> bool {
        self.terminal.is_some()
    }

    pub(crate) fn finish(self) -> (Option<R>, Option<Terminal>) {
        (self.value, self.terminal)
    }
}
