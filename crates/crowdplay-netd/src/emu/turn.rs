//! Per-emulator turn scheduling.
//!
//! A FIFO of requesters guarded by one mutex and one condvar. The scheduler
//! thread promotes the queue head to holder, announces it, sleeps up to the
//! configured turn length on the condvar, then demotes and rotates. A
//! disconnect removes the user wherever it sits; if it was the holder the
//! sleep is cut short. The queue holds weak references, so a user that is
//! gone can never be promoted.
//!
//! Invariant: the queue head, if any, is the current holder once its
//! `has_turn` flag is set; everyone behind it has `requested_turn` set and
//! `has_turn` clear.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use crowdplay_proto::encode;
use crowdplay_retro::RetroPad;

use crate::EmuId;
use crate::server::ServerCore;
use crate::user::User;

struct TurnQueue {
    queue: VecDeque<Weak<User>>,
    end_turn: bool,
    running: bool,
}

struct TurnState {
    inner: Mutex<TurnQueue>,
    cv: Condvar,
}

pub struct TurnScheduler {
    state: Arc<TurnState>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TurnScheduler {
    pub fn spawn(
        server: Arc<ServerCore>,
        emu_id: EmuId,
        pad: Arc<RetroPad>,
        turn_length: Duration,
    ) -> Self {
        let state = Arc::new(TurnState {
            inner: Mutex::new(TurnQueue {
                queue: VecDeque::new(),
                end_turn: false,
                running: true,
            }),
            cv: Condvar::new(),
        });

        let thread_state = Arc::clone(&state);
        let name = format!("turns-{emu_id}");
        let thread = thread::Builder::new()
            .name(name)
            .spawn(move || scheduler_loop(thread_state, server, emu_id, pad, turn_length))
            .ok();

        Self {
            state,
            thread: Mutex::new(thread),
        }
    }

    /// FIFO enqueue; a user already in the queue is ignored.
    pub fn add_request(&self, user: &Arc<User>) {
        let mut inner = self.state.inner.lock();
        if inner
            .queue
            .iter()
            .any(|entry| std::ptr::eq(entry.as_ptr(), Arc::as_ptr(user)))
        {
            return;
        }
        inner.queue.push_back(Arc::downgrade(user));
        debug!(conn = user.conn, depth = inner.queue.len(), "turn requested");
        self.state.cv.notify_all();
    }

    /// Drop a user from the queue wherever it sits. Ends the turn early if
    /// the user is the current holder.
    pub fn remove_user(&self, user: &Arc<User>) {
        let mut inner = self.state.inner.lock();
        let is_holder = inner
            .queue
            .front()
            .is_some_and(|entry| std::ptr::eq(entry.as_ptr(), Arc::as_ptr(user)))
            && user.has_turn();

        if is_holder {
            inner.end_turn = true;
        } else {
            inner
                .queue
                .retain(|entry| !std::ptr::eq(entry.as_ptr(), Arc::as_ptr(user)));
            user.clear_turn_flags();
        }
        self.state.cv.notify_all();
    }

    pub fn current_holder(&self) -> Option<Arc<User>> {
        self.state
            .inner
            .lock()
            .queue
            .front()
            .and_then(Weak::upgrade)
            .filter(|user| user.has_turn())
    }

    pub fn queue_len(&self) -> usize {
        self.state.inner.lock().queue.len()
    }

    pub fn stop(&self) {
        {
            let mut inner = self.state.inner.lock();
            inner.running = false;
        }
        self.state.cv.notify_all();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn scheduler_loop(
    state: Arc<TurnState>,
    server: Arc<ServerCore>,
    emu_id: EmuId,
    pad: Arc<RetroPad>,
    turn_length: Duration,
) {
    info!(emu = %emu_id, "turn scheduler started");

    loop {
        // Wait for a live requester and promote it while still holding the
        // lock, so a concurrent disconnect either removed the entry before
        // promotion or sees a holder and ends the turn early.
        let holder = {
            let mut inner = state.inner.lock();
            loop {
                if !inner.running {
                    return;
                }
                inner.queue.retain(|entry| entry.strong_count() > 0);
                if let Some(user) = inner.queue.front().and_then(Weak::upgrade) {
                    inner.end_turn = false;
                    user.has_turn
                        .store(true, std::sync::atomic::Ordering::Release);
                    break user;
                }
                state.cv.wait(&mut inner);
            }
        };

        pad.reset();
        server.broadcast_emu(&emu_id, &encode(&["turn", &holder.username()]));
        debug!(emu = %emu_id, conn = holder.conn, "turn granted");

        // Hold the turn until it expires or ends early.
        let deadline = Instant::now() + turn_length;
        let queue_empty = {
            let mut inner = state.inner.lock();
            while inner.running && !inner.end_turn {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                state.cv.wait_for(&mut inner, deadline - now);
            }

            holder.clear_turn_flags();
            if let Some(pos) = inner
                .queue
                .iter()
                .position(|entry| std::ptr::eq(entry.as_ptr(), Arc::as_ptr(&holder)))
            {
                inner.queue.remove(pos);
            }
            if !inner.running {
                return;
            }
            inner.queue.is_empty()
        };

        pad.reset();
        debug!(emu = %emu_id, conn = holder.conn, "turn ended");
        if queue_empty {
            server.broadcast_emu(&emu_id, &encode(&["turn", ""]));
        }
    }
}
