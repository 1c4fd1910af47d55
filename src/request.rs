//! Abortable requests
//!
//! Every backend call hands back a [`Request`]: a future plus an
//! [`AbortHandle`]. Aborting settles the request with
//! [`SurveyError::Cancelled`] and drops the in-flight HTTP call.

use crate::error::{Result, SurveyError};
use futures::future::{AbortHandle, Abortable, Aborted, BoxFuture};
use futures::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A pending backend call that can be cancelled
#[must_use = "requests do nothing unless awaited"]
pub struct Request<T> {
    inner: Abortable<BoxFuture<'static, Result<T>>>,
    handle: AbortHandle,
}

impl<T: Send + 'static> Request<T> {
    pub(crate) fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (handle, registration) = AbortHandle::new_pair();
        Self {
            inner: Abortable::new(future.boxed(), registration),
            handle,
        }
    }

    /// A request that settles immediately with `result`
    pub(crate) fn ready(result: Result<T>) -> Self {
        Self::new(futures::future::ready(result))
    }
}

impl<T> Request<T> {
    /// Handle that can cancel this request from elsewhere
    pub fn abort_handle(&self) -> AbortHandle {
        self.handle.clone()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_aborted(&self) -> bool {
        self.handle.is_aborted()
    }
}

impl<T> Future for Request<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(Aborted)) => Poll::Ready(Err(SurveyError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}
