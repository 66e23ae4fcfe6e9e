//! The shared transport timeline.
//!
//! All lifecycle phases are posted against one monotonic clock and execute
//! one at a time in timestamp order. The queue itself is passive: calling
//! [`Timeline::advance_to`] runs every due callback, which makes tests and
//! offline rendering deterministic. For wall-clock playback a
//! [`TimelineDriver`] thread advances the timeline continuously.

use crate::error::{Error, Result};
use crate::lockfree::AtomicDouble;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thread_priority::ThreadPriority;
use tracing::{debug, warn};

/// Handle of one scheduled one-shot callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u64);

/// Musical subdivisions the transport can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subdivision {
    Beat,
    Bar,
}

type Task = Box<dyn FnMut(f64) + Send>;

struct ScheduledEntry {
    time: f64,
    seq: u64,
    id: EventId,
    task: Task,
}

impl PartialEq for ScheduledEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for ScheduledEntry {}

impl PartialOrd for ScheduledEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEntry {
    // Reversed so the BinaryHeap pops the earliest (time, seq) first.
    // Seq breaks ties in insertion order.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .time
            .total_cmp(&self.time)
            .then(other.seq.cmp(&self.seq))
    }
}

struct Queue {
    heap: BinaryHeap<ScheduledEntry>,
    cancelled: HashSet<EventId>,
}

struct TimelineInner {
    queue: Mutex<Queue>,
    now: AtomicDouble,
    tempo: AtomicDouble,
    meter: Mutex<(u32, u32)>,
    next_seq: AtomicU64,
}

/// Cloneable handle to the shared transport timeline.
#[derive(Clone)]
pub struct Timeline {
    inner: Arc<TimelineInner>,
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Timeline {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TimelineInner {
                queue: Mutex::new(Queue {
                    heap: BinaryHeap::new(),
                    cancelled: HashSet::new(),
                }),
                now: AtomicDouble::new(0.0),
                tempo: AtomicDouble::new(120.0),
                meter: Mutex::new((4, 4)),
                next_seq: AtomicU64::new(1),
            }),
        }
    }

    /// Current transport time in seconds.
    pub fn now(&self) -> f64 {
        self.inner.now.get()
    }

    /// Post a one-shot callback at an absolute transport time.
    ///
    /// Callbacks scheduled for a time that has already passed fire on the
    /// next advance. The returned id cancels the callback as long as it
    /// has not fired yet.
    pub fn schedule<F>(&self, time: f64, task: F) -> EventId
    where
        F: FnMut(f64) + Send + 'static,
    {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = EventId(seq);
        self.inner.queue.lock().heap.push(ScheduledEntry {
            time,
            seq,
            id,
            task: Box::new(task),
        });
        id
    }

    /// Cancel a pending callback. Returns false if it already fired.
    pub fn cancel(&self, id: EventId) -> bool {
        let mut queue = self.inner.queue.lock();
        if queue.heap.iter().any(|e| e.id == id) {
            queue.cancelled.insert(id);
            true
        } else {
            false
        }
    }

    /// Time of the earliest pending callback, if any.
    pub fn next_due(&self) -> Option<f64> {
        let mut guard = self.inner.queue.lock();
        let queue = &mut *guard;
        while let Some(entry) = queue.heap.peek() {
            if queue.cancelled.remove(&entry.id) {
                queue.heap.pop();
            } else {
                return Some(entry.time);
            }
        }
        None
    }

    /// Number of pending (non-cancelled) callbacks.
    pub fn pending(&self) -> usize {
        let queue = self.inner.queue.lock();
        queue.heap.len() - queue.cancelled.len()
    }

    /// Advance the clock to `target`, firing every due callback in
    /// timestamp order.
    ///
    /// Callbacks run with the queue unlocked, so they may schedule or
    /// cancel further callbacks; anything they schedule at or before
    /// `target` fires within the same advance.
    pub fn advance_to(&self, target: f64) {
        loop {
            let mut entry = {
                let mut guard = self.inner.queue.lock();
                let queue = &mut *guard;
                loop {
                    match queue.heap.peek() {
                        Some(e) if e.time <= target => {
                            if queue.cancelled.remove(&e.id) {
                                queue.heap.pop();
                                continue;
                            }
                            break queue.heap.pop().unwrap();
                        }
                        _ => return self.finish_advance(target),
                    }
                }
            };
            // The clock never moves backwards, even for late entries.
            let fire_at = entry.time.max(self.inner.now.get());
            self.inner.now.set(fire_at);
            (entry.task)(entry.time);
        }
    }

    fn finish_advance(&self, target: f64) {
        if target > self.inner.now.get() {
            self.inner.now.set(target);
        }
    }

    /// Set the transport tempo in BPM.
    pub fn set_tempo(&self, bpm: f64) -> Result<()> {
        if !(20.0..=999.0).contains(&bpm) {
            return Err(Error::InvalidTempo(bpm));
        }
        self.inner.tempo.set(bpm);
        Ok(())
    }

    pub fn tempo(&self) -> f64 {
        self.inner.tempo.get()
    }

    /// Set the time signature.
    pub fn set_meter(&self, numerator: u32, denominator: u32) -> Result<()> {
        if numerator == 0 || denominator == 0 {
            return Err(Error::InvalidConfig(format!(
                "invalid time signature: {numerator}/{denominator}"
            )));
        }
        *self.inner.meter.lock() = (numerator, denominator);
        Ok(())
    }

    /// Absolute time of the next subdivision boundary strictly after now.
    pub fn next_subdivision(&self, subdivision: Subdivision) -> f64 {
        let beat = 60.0 / self.tempo();
        let length = match subdivision {
            Subdivision::Beat => beat,
            Subdivision::Bar => beat * self.inner.meter.lock().0 as f64,
        };
        let now = self.now();
        (now / length).floor() * length + length
    }
}

enum DriverCommand {
    Run,
    Pause,
    Shutdown,
}

/// Wall-clock driver advancing a [`Timeline`] from a dedicated thread.
pub struct TimelineDriver {
    command_tx: Sender<DriverCommand>,
    handle: Option<JoinHandle<()>>,
}

impl TimelineDriver {
    /// Spawn the driver thread, advancing `timeline` every `tick`.
    ///
    /// The driver starts running; `pause` freezes the transport clock
    /// without dropping pending callbacks.
    pub fn spawn(timeline: Timeline, tick: Duration) -> Self {
        let (command_tx, command_rx) = bounded(16);

        let handle = thread::Builder::new()
            .name("attacca-timeline".into())
            .spawn(move || {
                if thread_priority::set_current_thread_priority(ThreadPriority::Max).is_err() {
                    warn!("could not raise timeline thread priority");
                }
                debug!(tick_ms = tick.as_millis() as u64, "timeline driver started");

                let mut clock = timeline.now();
                let mut running = true;
                let mut last = Instant::now();
                loop {
                    match command_rx.recv_timeout(tick) {
                        Ok(DriverCommand::Run) => {
                            last = Instant::now();
                            running = true;
                        }
                        Ok(DriverCommand::Pause) => {
                            if running {
                                clock += last.elapsed().as_secs_f64();
                                timeline.advance_to(clock);
                            }
                            running = false;
                        }
                        Ok(DriverCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                            debug!("timeline driver shutting down");
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                    if running {
                        clock += last.elapsed().as_secs_f64();
                        last = Instant::now();
                        timeline.advance_to(clock);
                    }
                }
            })
            .expect("failed to spawn timeline driver");

        Self {
            command_tx,
            handle: Some(handle),
        }
    }

    /// Resume the transport after a pause.
    pub fn run(&self) {
        let _ = self.command_tx.send(DriverCommand::Run);
    }

    /// Freeze the transport clock.
    pub fn pause(&self) {
        let _ = self.command_tx.send(DriverCommand::Pause);
    }

    /// Stop the driver thread and wait for it to exit.
    pub fn shutdown(&mut self) {
        let _ = self.command_tx.send(DriverCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TimelineDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
