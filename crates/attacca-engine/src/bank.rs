//! Shared buffer bank with background decoding and time-windowed reuse.
//!
//! Decoded buffers are keyed by URI and handed out as `Arc<AudioBuffer>`.
//! Concurrent fetches for the same URI coalesce onto one decode; a buffer
//! whose last fetch fell out of the reuse window is evicted on the next
//! release.

use std::sync::Arc;
use std::thread;

use attacca_core::{AudioBuffer, DynamicBufferLifeCycle, Error, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Decodes an audio source URI into a planar buffer.
pub trait Decode: Send + Sync {
    fn decode(&self, uri: &str) -> Result<AudioBuffer>;
}

/// WAV file decoder.
pub struct WavDecoder;

impl Decode for WavDecoder {
    fn decode(&self, uri: &str) -> Result<AudioBuffer> {
        let decode_err = |message: String| Error::Decode {
            uri: uri.to_string(),
            message,
        };

        let reader = hound::WavReader::open(uri).map_err(|e| decode_err(e.to_string()))?;
        let spec = reader.spec();
        let channel_count = spec.channels as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| decode_err(e.to_string()))?,
            hound::SampleFormat::Int => {
                let full_scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / full_scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| decode_err(e.to_string()))?
            }
        };

        let frames = interleaved.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in interleaved.chunks_exact(channel_count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
        Ok(AudioBuffer::new(spec.sample_rate as f64, channels))
    }
}

type Notify = Sender<Result<Arc<AudioBuffer>>>;

enum Slot {
    /// Decode in flight; senders to wake once it lands.
    Pending(Vec<Notify>),
    Ready(Arc<AudioBuffer>),
}

struct BankEntry {
    slot: Slot,
    last_requested: f64,
}

/// Buffer cache shared between the scheduler and every live object.
///
/// Cloning is cheap and all clones feed the same loader thread. The
/// thread exits once every clone has been dropped.
#[derive(Clone)]
pub struct BufferBank {
    entries: Arc<DashMap<String, BankEntry>>,
    requests: Sender<String>,
    timings: Arc<Mutex<DynamicBufferLifeCycle>>,
}

impl BufferBank {
    pub fn new(decoder: Arc<dyn Decode>, timings: Arc<Mutex<DynamicBufferLifeCycle>>) -> Self {
        let (requests, queue) = unbounded::<String>();
        let entries: Arc<DashMap<String, BankEntry>> = Arc::new(DashMap::new());

        let loader_entries = Arc::clone(&entries);
        thread::spawn(move || loader_loop(queue, decoder, loader_entries));

        Self {
            entries,
            requests,
            timings,
        }
    }

    /// Request the buffer for `uri`, starting a decode if none is in
    /// flight. `now` refreshes the entry's reuse window.
    pub fn fetch(&self, uri: &str, now: f64) -> FetchHandle {
        match self.entries.entry(uri.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.last_requested = now;
                match &mut entry.slot {
                    Slot::Ready(buffer) => FetchHandle::ready(uri, Arc::clone(buffer)),
                    Slot::Pending(waiters) => {
                        let (tx, rx) = bounded(1);
                        waiters.push(tx);
                        FetchHandle::waiting(uri, rx)
                    }
                }
            }
            MapEntry::Vacant(vacant) => {
                debug!(uri, "queueing decode");
                let (tx, rx) = bounded(1);
                vacant.insert(BankEntry {
                    slot: Slot::Pending(vec![tx]),
                    last_requested: now,
                });
                let _ = self.requests.send(uri.to_string());
                FetchHandle::waiting(uri, rx)
            }
        }
    }

    /// Drop `uri`'s claim and sweep out every buffer whose last fetch
    /// fell out of the reuse window. Only fetches move the eviction
    /// horizon; a release never extends a buffer's lifetime.
    pub fn release(&self, uri: &str, now: f64) {
        debug!(uri, "buffer claim released");
        self.evict_stale(now);
    }

    fn evict_stale(&self, now: f64) {
        let window = self.timings.lock().min_unused_time();
        self.entries.retain(|uri, entry| {
            let keep = matches!(entry.slot, Slot::Pending(_))
                || now - entry.last_requested <= window;
            if !keep {
                debug!(uri, "evicting unused buffer");
            }
            keep
        });
    }

    /// Number of cached or in-flight entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn loader_loop(
    queue: Receiver<String>,
    decoder: Arc<dyn Decode>,
    entries: Arc<DashMap<String, BankEntry>>,
) {
    while let Ok(uri) = queue.recv() {
        let result = decoder.decode(&uri).map(Arc::new);
        match result {
            Ok(buffer) => {
                debug!(uri, frames = buffer.len(), "decoded");
                if let Some(mut entry) = entries.get_mut(&uri) {
                    let previous =
                        std::mem::replace(&mut entry.slot, Slot::Ready(Arc::clone(&buffer)));
                    drop(entry);
                    if let Slot::Pending(waiters) = previous {
                        for waiter in waiters {
                            let _ = waiter.send(Ok(Arc::clone(&buffer)));
                        }
                    }
                }
            }
            Err(err) => {
                warn!(uri, %err, "decode failed");
                if let Some((_, entry)) = entries.remove(&uri) {
                    if let Slot::Pending(waiters) = entry.slot {
                        for waiter in waiters {
                            let _ = waiter.send(Err(err.clone()));
                        }
                    }
                }
            }
        }
    }
}

enum HandleState {
    Ready(Arc<AudioBuffer>),
    Waiting(Receiver<Result<Arc<AudioBuffer>>>),
    Failed(Error),
}

/// Outcome of a [`BufferBank::fetch`], pollable without blocking.
pub struct FetchHandle {
    uri: String,
    state: HandleState,
}

impl FetchHandle {
    fn ready(uri: &str, buffer: Arc<AudioBuffer>) -> Self {
        Self {
            uri: uri.to_string(),
            state: HandleState::Ready(buffer),
        }
    }

    fn waiting(uri: &str, rx: Receiver<Result<Arc<AudioBuffer>>>) -> Self {
        Self {
            uri: uri.to_string(),
            state: HandleState::Waiting(rx),
        }
    }

    fn lost(uri: &str) -> Error {
        Error::Decode {
            uri: uri.to_string(),
            message: "loader shut down before the decode finished".into(),
        }
    }

    /// Non-blocking check. `None` while the decode is still in flight.
    pub fn poll(&mut self) -> Option<Result<Arc<AudioBuffer>>> {
        match &mut self.state {
            HandleState::Ready(buffer) => Some(Ok(Arc::clone(buffer))),
            HandleState::Failed(err) => Some(Err(err.clone())),
            HandleState::Waiting(rx) => match rx.try_recv() {
                Ok(Ok(buffer)) => {
                    self.state = HandleState::Ready(Arc::clone(&buffer));
                    Some(Ok(buffer))
                }
                Ok(Err(err)) => {
                    self.state = HandleState::Failed(err.clone());
                    Some(Err(err))
                }
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => {
                    let err = Self::lost(&self.uri);
                    self.state = HandleState::Failed(err.clone());
                    Some(Err(err))
                }
            },
        }
    }

    /// Block until the decode finishes.
    pub fn wait(self) -> Result<Arc<AudioBuffer>> {
        let Self { uri, state } = self;
        match state {
            HandleState::Ready(buffer) => Ok(buffer),
            HandleState::Failed(err) => Err(err),
            HandleState::Waiting(rx) => match rx.recv() {
                Ok(result) => result,
                Err(_) => Err(Self::lost(&uri)),
            },
        }
    }
}
