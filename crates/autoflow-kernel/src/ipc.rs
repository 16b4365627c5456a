//! Typed request/response channel.
//!
//! Front-ends (the CLI's JSON-lines server, tests) talk to the automation
//! service through a [`RequestChannel`].  Every call carries its own
//! [`oneshot`] reply slot, so responses can never be delivered to the wrong
//! caller, and every call is bounded by an explicit timeout.  Errors travel
//! back as values inside `Resp`; the channel itself only fails when the
//! serving side is gone or too slow.
//!
//! # Usage
//!
//! ```rust,no_run
//! # use std::time::Duration;
//! # use autoflow_kernel::ipc::request_channel;
//! # async fn example() {
//! let (channel, mut receiver) = request_channel::<String, usize>(16, Duration::from_secs(5));
//!
//! tokio::spawn(async move {
//!     while let Some(envelope) = receiver.recv().await {
//!         let len = envelope.request().len();
//!         envelope.respond(len);
//!     }
//! });
//!
//! let len = channel.call("hello".to_string()).await.unwrap();
//! assert_eq!(len, 5);
//! # }
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::error::{KernelError, Result};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A request paired with the slot its reply must be written to.
#[derive(Debug)]
pub struct Envelope<Req, Resp> {
    request: Req,
    reply: oneshot::Sender<Resp>,
}

impl<Req, Resp> Envelope<Req, Resp> {
    /// Borrow the request payload.
    pub fn request(&self) -> &Req {
        &self.request
    }

    /// Split into the request and a responder that can be moved into a task.
    pub fn into_parts(self) -> (Req, Responder<Resp>) {
        (self.request, Responder { reply: self.reply })
    }

    /// Answer the request.  Returns `false` if the caller already gave up.
    pub fn respond(self, response: Resp) -> bool {
        self.reply.send(response).is_ok()
    }
}

/// The reply half of an [`Envelope`].
#[derive(Debug)]
pub struct Responder<Resp> {
    reply: oneshot::Sender<Resp>,
}

impl<Resp> Responder<Resp> {
    /// Answer the request.  Returns `false` if the caller already gave up.
    pub fn respond(self, response: Resp) -> bool {
        let delivered = self.reply.send(response).is_ok();
        if !delivered {
            tracing::trace!("caller dropped before reply was delivered");
        }
        delivered
    }
}

// ---------------------------------------------------------------------------
// Channel halves
// ---------------------------------------------------------------------------

/// Client half: cheaply cloneable, `Send + Sync`.
#[derive(Debug)]
pub struct RequestChannel<Req, Resp> {
    sender: mpsc::Sender<Envelope<Req, Resp>>,
    timeout: Duration,
}

impl<Req, Resp> Clone for RequestChannel<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            timeout: self.timeout,
        }
    }
}

/// Server half: yields envelopes in arrival order.
#[derive(Debug)]
pub struct RequestReceiver<Req, Resp> {
    receiver: mpsc::Receiver<Envelope<Req, Resp>>,
}

/// Create a bounded request channel whose calls time out after `timeout`.
pub fn request_channel<Req, Resp>(
    capacity: usize,
    timeout: Duration,
) -> (RequestChannel<Req, Resp>, RequestReceiver<Req, Resp>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        RequestChannel { sender, timeout },
        RequestReceiver { receiver },
    )
}

impl<Req, Resp> RequestChannel<Req, Resp> {
    /// Send a request and wait for its reply using the channel's default
    /// timeout.
    pub async fn call(&self, request: Req) -> Result<Resp> {
        self.call_with_timeout(request, self.timeout).await
    }

    /// Send a request and wait at most `timeout` for the reply.
    ///
    /// The deadline covers both queueing and handling.
    pub async fn call_with_timeout(&self, request: Req, timeout: Duration) -> Result<Resp> {
        let (reply, rx) = oneshot::channel();
        let envelope = Envelope { request, reply };

        let exchange = async {
            self.sender
                .send(envelope)
                .await
                .map_err(|_| KernelError::ChannelClosed)?;
            tracing::trace!("request queued");
            rx.await.map_err(|_| KernelError::ReplyDropped)
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| KernelError::RequestTimeout { timeout })?
    }

    /// Whether the serving side has shut down.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<Req, Resp> RequestReceiver<Req, Resp> {
    /// Wait for the next request.  Returns `None` once every client half has
    /// been dropped.
    pub async fn recv(&mut self) -> Option<Envelope<Req, Resp>> {
        self.receiver.recv().await
    }

    /// Stop accepting new requests; queued envelopes can still be drained.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
