//! Core-to-render-thread frame handoff.
//!
//! The TA render context is built on the core thread; ownership then passes
//! to the render thread, which holds the frame until the next conversion
//! finishes. Only the latest frame matters, so a pending frame that was
//! never collected is replaced, and its buffers are recycled back to the
//! producer to avoid reallocating every frame.

use std::sync::{Arc, Mutex};

use katana_pvr::TrContext;

#[derive(Default)]
struct Channel {
    pending: Mutex<ChannelState>,
}

#[derive(Default)]
struct ChannelState {
    frame: Option<Box<TrContext>>,
    /// Consumed contexts handed back for reuse.
    free: Vec<Box<TrContext>>,
}

pub struct FrameSender {
    channel: Arc<Channel>,
}

pub struct FrameReceiver {
    channel: Arc<Channel>,
}

pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    let channel = Arc::new(Channel::default());
    (
        FrameSender {
            channel: channel.clone(),
        },
        FrameReceiver { channel },
    )
}

impl FrameSender {
    /// A recycled context to convert the next frame into, if one is free.
    pub fn recycle(&self) -> Box<TrContext> {
        let mut state = self.channel.pending.lock().unwrap();
        state.free.pop().unwrap_or_default()
    }

    /// Publish a converted frame, replacing any frame the renderer has not
    /// collected yet.
    pub fn submit(&self, frame: Box<TrContext>) {
        let mut state = self.channel.pending.lock().unwrap();
        if let Some(stale) = state.frame.replace(frame) {
            state.free.push(stale);
        }
    }
}

impl FrameReceiver {
    /// Take the latest frame, if one was submitted.
    pub fn try_take(&self) -> Option<Box<TrContext>> {
        self.channel.pending.lock().unwrap().frame.take()
    }

    /// Hand a rendered frame's buffers back for reuse.
    pub fn release(&self, frame: Box<TrContext>) {
        self.channel.pending.lock().unwrap().free.push(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_frame_wins() {
        let (tx, rx) = frame_channel();

        let mut a = tx.recycle();
        a.width = 1;
        tx.submit(a);

        let mut b = tx.recycle();
        b.width = 2;
        tx.submit(b);

        let frame = rx.try_take().unwrap();
        assert_eq!(frame.width, 2);
        assert!(rx.try_take().is_none());
        rx.release(frame);
    }

    #[test]
    fn released_contexts_are_recycled() {
        let (tx, rx) = frame_channel();

        let mut frame = tx.recycle();
        frame.width = 640;
        frame.verts.reserve(1024);
        tx.submit(frame);

        let frame = rx.try_take().unwrap();
        let cap = frame.verts.capacity();
        rx.release(frame);

        // the recycled context keeps its allocations
        let reused = tx.recycle();
        assert!(reused.verts.capacity() >= cap);
    }

    #[test]
    fn handoff_crosses_threads() {
        let (tx, rx) = frame_channel();

        let render = std::thread::spawn(move || loop {
            if let Some(frame) = rx.try_take() {
                return frame.width;
            }
            std::thread::yield_now();
        });

        let mut frame = tx.recycle();
        frame.width = 320;
        tx.submit(frame);

        assert_eq!(render.join().unwrap(), 320);
    }
}
