//! Per-client live update stream.
//!
//! Each connected client owns one [`LiveUpdateStream`]. On connect it
//! subscribes to the update bus; the bus listener only pushes into a bounded
//! channel, which the stream drains in publish order. A keep-alive timer
//! interleaves inert messages so idle connections survive proxies.
//!
//! A client that falls more than [`UPDATE_BUFFER`] updates behind is
//! disconnected instead of buffered without limit. Dropping the stream
//! (client disconnect, write error, overflow, server shutdown) unsubscribes
//! from the bus and stops the timer.

use crate::{
    error::BookingError,
    types::{RegistrationUpdated, REGISTRATION_UPDATED},
    update_bus::{Subscription, UpdateBus},
};
use axum::response::sse::Event;
use futures::{Stream, StreamExt};
use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Duration,
};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

pub const KEEP_ALIVE_COMMENT: &str = "keep-alive";
pub const UPDATE_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveMessage {
    Update(RegistrationUpdated),
    KeepAlive,
}

impl LiveMessage {
    pub fn into_event(self) -> Result<Event, BookingError> {
        match self {
            LiveMessage::Update(update) => Event::default()
                .event(REGISTRATION_UPDATED)
                .json_data(&update)
                .map_err(|err| BookingError::Stream(err.to_string())),
            LiveMessage::KeepAlive => Ok(Event::default().comment(KEEP_ALIVE_COMMENT)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Streaming,
    Closed,
}

pub struct LiveUpdateStream {
    id: Uuid,
    state: StreamState,
    updates: ReceiverStream<RegistrationUpdated>,
    overflowed: Arc<AtomicBool>,
    keep_alive: Option<Interval>,
    subscription: Option<Subscription<RegistrationUpdated>>,
}

impl LiveUpdateStream {
    /// Must be called from within a tokio runtime.
    pub fn connect(bus: &UpdateBus<RegistrationUpdated>, keep_alive_interval: Duration) -> Self {
        Self::with_buffer(bus, keep_alive_interval, UPDATE_BUFFER)
    }

    fn with_buffer(
        bus: &UpdateBus<RegistrationUpdated>,
        keep_alive_interval: Duration,
        buffer: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(buffer);
        let overflowed = Arc::new(AtomicBool::new(false));
        let mut stream = Self {
            id: Uuid::new_v4(),
            state: StreamState::Connecting,
            updates: ReceiverStream::new(receiver),
            overflowed: overflowed.clone(),
            keep_alive: None,
            subscription: None,
        };

        stream.subscription = Some(bus.subscribe(
            REGISTRATION_UPDATED,
            move |update: &RegistrationUpdated| match sender.try_send(update.clone()) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    overflowed.store(true, Ordering::SeqCst);
                    Err("live update stream is full".to_string())
                }
                Err(TrySendError::Closed(_)) => Err("live update stream is gone".to_string()),
            },
        ));

        let mut keep_alive =
            time::interval_at(Instant::now() + keep_alive_interval, keep_alive_interval);
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        stream.keep_alive = Some(keep_alive);

        stream.state = StreamState::Streaming;
        info!(stream_id = %stream.id, "Live update stream connected");
        stream
    }

    #[cfg(test)]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[cfg(test)]
    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn close(&mut self) {
        if self.state == StreamState::Closed {
            return;
        }
        self.subscription.take();
        self.keep_alive.take();
        self.updates.close();
        self.state = StreamState::Closed;
        info!(stream_id = %self.id, "Live update stream closed");
    }
}

impl Stream for LiveUpdateStream {
    type Item = LiveMessage;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state == StreamState::Closed {
            return Poll::Ready(None);
        }
        if this.overflowed.load(Ordering::SeqCst) {
            warn!(stream_id = %this.id, "Live update stream fell behind, disconnecting");
            this.close();
            return Poll::Ready(None);
        }

        match this.updates.poll_next_unpin(cx) {
            Poll::Ready(Some(update)) => return Poll::Ready(Some(LiveMessage::Update(update))),
            Poll::Ready(None) => {
                this.close();
                return Poll::Ready(None);
            }
            Poll::Pending => {}
        }

        if let Some(keep_alive) = this.keep_alive.as_mut() {
            if keep_alive.poll_tick(cx).is_ready() {
                return Poll::Ready(Some(LiveMessage::KeepAlive));
            }
        }
        Poll::Pending
    }
}

impl Drop for LiveUpdateStream {
    fn drop(&mut self) {
        self.close();
    }
}
