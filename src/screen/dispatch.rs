//! Dispatch loop and completion correlator
//!
//! One thread per screen reads events from the backend forever. Window events
//! are forwarded to the owning window's channel, blocking while that channel
//! is full, so every window sees its events in server order. ShmCompletion
//! events resolve pending uploads.

use super::Shared;
use crate::backend::Xid;
use crate::error::{Error, Result};
use std::sync::Arc;
use std::thread;
use x11rb::protocol::Event;

pub(super) fn spawn(shared: Arc<Shared>) -> Result<()> {
    thread::Builder::new()
        .name("x11-dispatch".into())
        .spawn(move || run(&shared))
        .map_err(Error::Spawn)?;
    Ok(())
}

fn run(shared: &Shared) {
    log::debug!("dispatch thread started");
    loop {
        match shared.backend.wait_for_event() {
            Ok(event) => handle_event(shared, event),
            Err(e) => log::warn!("error reading event: {}", e),
        }
    }
}

/// The window an event is addressed to, for the kinds we route
fn event_window(event: &Event) -> Option<Xid> {
    Some(match event {
        Event::ClientMessage(ev) => ev.window,
        Event::ConfigureNotify(ev) => ev.window,
        Event::DestroyNotify(ev) => ev.window,
        Event::Expose(ev) => ev.window,
        Event::FocusIn(ev) => ev.event,
        Event::FocusOut(ev) => ev.event,
        Event::KeyPress(ev) => ev.event,
        Event::KeyRelease(ev) => ev.event,
        Event::ButtonPress(ev) => ev.event,
        Event::ButtonRelease(ev) => ev.event,
        Event::MotionNotify(ev) => ev.event,
        _ => return None,
    })
}

fn handle_event(shared: &Shared, event: Event) {
    if let Event::ShmCompletion(ev) = &event {
        handle_completion(shared, ev.sequence);
        return;
    }
    let Some(window) = event_window(&event) else {
        return;
    };

    let sender = {
        let mut tables = shared.tables();
        if let Event::DestroyNotify(_) = event {
            // Dropping the sender here ends the window's stream
            match tables.remove_window(window) {
                Some(_) => log::debug!("window 0x{:x} destroyed", window),
                None => log::debug!("DestroyNotify for unknown window 0x{:x}", window),
            }
            return;
        }
        tables.window(window)
    };

    match sender {
        Some(sender) => {
            if sender.send(event).is_err() {
                log::debug!("window 0x{:x} is no longer reading events", window);
            }
        }
        None => log::debug!("dropping event for unknown window 0x{:x}", window),
    }
}

fn handle_completion(shared: &Shared, sequence: u16) {
    let found = {
        let mut tables = shared.tables();
        tables.take_upload(sequence).map(|completion| {
            let state = tables.buffer(completion.segment);
            (completion, state)
        })
    };
    let Some((completion, state)) = found else {
        log::debug!("ShmCompletion for unknown sequence {}", sequence);
        return;
    };

    match state {
        Some(state) => {
            if let Some(retired) = state.finish() {
                retired.free(shared);
            }
        }
        None => log::debug!(
            "segment 0x{:x} was released before its upload completed",
            completion.segment
        ),
    }

    if let Some(recipient) = completion.recipient {
        let event = completion.event;
        let spawned = thread::Builder::new()
            .name("x11-upload".into())
            .spawn(move || recipient.uploaded(event));
        if let Err(e) = spawned {
            log::warn!("failed to deliver upload completion: {}", e);
        }
    }
}
