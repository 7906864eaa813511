//! HTTP server ↔ main loop channels.
//!
//! The httpd handler thread never touches application state.  It posts
//! the request, blocks until the main loop answered, writes the response
//! and acknowledges the flush so deferred actions can run.
//!
//! ```text
//! ┌──────────────┐  HttpRequest   ┌──────────────┐
//! │ httpd thread │──────────────▶│  Main loop   │
//! │  (blocking)  │◀──────────────│  (sync)      │
//! └──────────────┘ Ticket+Response └──────────────┘
//!         │         Flushed(Ticket)      ▲
//!         └──────────────────────────────┘
//! ```
//!
//! Every response carries a [`Ticket`] and its flush acknowledgement
//! echoes it, so a follow-up armed for one response never fires on the
//! late acknowledgement of an earlier one.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, warn};

use super::{HttpRequest, HttpResponse};
use crate::app::service::FollowUp;

/// One request in flight; the server handles requests one at a time.
const DEPTH: usize = 1;

/// Acks may pile up for a couple of loop iterations before they are drained.
const FLUSH_DEPTH: usize = 4;

/// Identifies one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u32);

static NEXT_TICKET: AtomicU32 = AtomicU32::new(0);

/// Request channel: httpd thread → main loop.
pub static REQUEST_CHANNEL: Channel<CriticalSectionRawMutex, HttpRequest, DEPTH> = Channel::new();

/// Response channel: main loop → httpd thread.
pub static RESPONSE_CHANNEL: Channel<CriticalSectionRawMutex, (Ticket, HttpResponse), DEPTH> = Channel::new();

/// Sent after the response with this ticket has been written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flushed(pub Ticket);

/// Flush channel: httpd thread → main loop.
pub static FLUSH_CHANNEL: Channel<CriticalSectionRawMutex, Flushed, FLUSH_DEPTH> = Channel::new();

/// Server side: hand a request to the main loop and wait for the answer.
pub fn exchange(request: HttpRequest) -> (Ticket, HttpResponse) {
    futures_lite::future::block_on(async {
        REQUEST_CHANNEL.send(request).await;
        RESPONSE_CHANNEL.receive().await
    })
}

/// Server side: the response with `ticket` reached the socket.
pub fn acknowledge_flush(ticket: Ticket) {
    if FLUSH_CHANNEL.try_send(Flushed(ticket)).is_err() {
        warn!("Web: flush channel full");
    }
}

/// Main loop side: next pending request, if any.
pub fn poll_request() -> Option<HttpRequest> {
    REQUEST_CHANNEL.try_receive().ok()
}

/// Main loop side: answer the request taken by [`poll_request`].
pub fn respond(response: HttpResponse) -> Ticket {
    let ticket = Ticket(NEXT_TICKET.fetch_add(1, Ordering::Relaxed));
    if RESPONSE_CHANNEL.try_send((ticket, response)).is_err() {
        warn!("Web: response channel full, reply dropped");
    }
    ticket
}

/// Main loop side: next flush acknowledgement, if any.
pub fn take_flushed() -> Option<Ticket> {
    FLUSH_CHANNEL.try_receive().ok().map(|Flushed(ticket)| ticket)
}

/// A follow-up held back until its own response was flushed.
#[derive(Debug, Default)]
pub struct Deferred {
    pending: Option<(Ticket, FollowUp)>,
}

impl Deferred {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold `follow` until the response with `ticket` is flushed.  A newer
    /// follow-up replaces an older one; `FollowUp::None` changes nothing.
    pub fn arm(&mut self, ticket: Ticket, follow: FollowUp) {
        if follow != FollowUp::None {
            self.pending = Some((ticket, follow));
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Drain the flush channel.  Returns the armed follow-up once its
    /// ticket was acknowledged, `FollowUp::None` otherwise.
    pub fn poll(&mut self) -> FollowUp {
        self.settle(core::iter::from_fn(take_flushed))
    }

    /// [`poll`](Self::poll) over an explicit sequence of acknowledgements.
    pub fn settle(&mut self, acks: impl IntoIterator<Item = Ticket>) -> FollowUp {
        let mut due = FollowUp::None;
        for ack in acks {
            match self.pending {
                Some((ticket, follow)) if ticket == ack => {
                    self.pending = None;
                    due = follow;
                }
                _ => debug!("Web: flush {:?} has no follow-up", ack),
            }
        }
        due
    }
}
