//! Writer layering for artifacts built out of wrapped streams.
//!
//! A tar-over-gzip-over-file artifact has three resources that must each
//! be finalised, in reverse construction order: the tar trailer, the
//! gzip frame, the file itself. Rust ownership does not allow the gzip
//! encoder and its closer to both own the file, so each layer lives
//! behind a [`Stacked`] handle: the layer above writes through one clone
//! of the handle while the registered closer takes the writer out
//! exactly once to finalise it.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use roll_engine::InnerClose;

/// A writer layer that can be written through by the layer above it
/// while staying individually closable.
pub struct Stacked<W> {
    inner: Arc<Mutex<Option<W>>>,
}

impl<W> Stacked<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(writer))),
        }
    }
}

impl<W> Clone for Stacked<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: Write> Write for Stacked<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("writer layer poisoned"))?;
        match guard.as_mut() {
            Some(writer) => writer.write(buf),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "writer layer already closed",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("writer layer poisoned"))?;
        match guard.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Send + 'static> Stacked<W> {
    /// Build the inner closer for this layer. `finish` receives the
    /// writer exactly once; a second close finds the layer empty and is
    /// a no-op.
    pub fn closer<F>(&self, finish: F) -> Box<dyn InnerClose>
    where
        F: FnOnce(W) -> io::Result<()> + Send + 'static,
    {
        Box::new(StackedCloser {
            layer: self.clone(),
            finish,
        })
    }
}

struct StackedCloser<W, F> {
    layer: Stacked<W>,
    finish: F,
}

impl<W, F> InnerClose for StackedCloser<W, F>
where
    W: Send,
    F: FnOnce(W) -> io::Result<()> + Send,
{
    fn close(self: Box<Self>) -> io::Result<()> {
        let this = *self;
        let taken = {
            let mut guard = this
                .layer
                .inner
                .lock()
                .map_err(|_| io::Error::other("writer layer poisoned"))?;
            guard.take()
        };
        match taken {
            Some(writer) => (this.finish)(writer),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "stack_test.rs"]
mod stack_test;
