//! Single-writer, multi-reader access to a [`RingBuffer`].
//!
//! The writer appends at an absolute stream position; readers address
//! windows by the same absolute positions. Reader access is guarded by pins:
//!
//! - a reader pins its window's start position while its closure runs, and
//!   only if the window is fully written and not claimed by the writer;
//! - before overwriting, the writer claims the region it is about to fill and
//!   waits until no pin lies inside it.
//!
//! So a reader never sees samples being written, and a window that the
//! writer has already lapped reads as `None` instead of garbage.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use scan_core::Sample;
use tracing::{trace, warn};

use crate::storage::Backend;
use crate::{RingBuffer, RingError};

/// How long the writer waits on a pinned window before logging again.
const PIN_WAIT: Duration = Duration::from_millis(100);

/// Absolute location of a published run of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingSpan {
    /// Absolute stream position of the first sample.
    pub position: u64,
    /// Number of samples.
    pub len: usize,
}

#[derive(Debug, Default)]
struct Cursor {
    /// Samples published to readers.
    committed: u64,
    /// End of the region the writer is filling (>= committed).
    claimed: u64,
    /// Pinned window start positions and their reader counts.
    pins: BTreeMap<u64, usize>,
}

struct Shared {
    ring: RingBuffer,
    cursor: Mutex<Cursor>,
    released: Condvar,
}

/// Split a ring into its writer and a clonable reader.
#[must_use]
pub fn split(ring: RingBuffer) -> (RingWriter, RingReader) {
    let shared = Arc::new(Shared {
        ring,
        cursor: Mutex::new(Cursor::default()),
        released: Condvar::new(),
    });
    (
        RingWriter {
            shared: Arc::clone(&shared),
            scratch: Vec::new(),
            stalls: 0,
        },
        RingReader { shared },
    )
}

/// The single producer appending to a shared ring.
pub struct RingWriter {
    shared: Arc<Shared>,
    scratch: Vec<Sample>,
    stalls: u64,
}

impl RingWriter {
    /// Let `fill` write up to `max` samples directly into the ring and
    /// publish the count it returns.
    ///
    /// On the mirrored backend `fill` receives the ring memory itself. On the
    /// copy-on-wrap backend a window crossing the end is filled in a scratch
    /// buffer and split-copied. If `fill` fails nothing is published.
    pub fn fill<E, F>(&mut self, max: usize, fill: F) -> Result<RingSpan, E>
    where
        E: From<RingError>,
        F: FnOnce(&mut [Sample]) -> Result<usize, E>,
    {
        let capacity = self.shared.ring.capacity();
        if max > capacity {
            return Err(RingError::WindowTooLarge { len: max, capacity }.into());
        }

        let head = self.claim(max);
        let offset = (head % capacity as u64) as usize;

        let region = match self.shared.ring.region(offset, max) {
            Ok(region) => region,
            Err(e) => {
                self.publish(head, 0);
                return Err(e.into());
            }
        };

        let written = match region.contiguous() {
            // SAFETY: the claim keeps readers out of [head, head + max) and
            // this is the only writer.
            Some(ptr) => fill(unsafe { std::slice::from_raw_parts_mut(ptr, max) }),
            None => {
                self.scratch.resize(max, Sample::default());
                let result = fill(&mut self.scratch);
                if let Ok(n) = result {
                    let n = n.min(max);
                    // SAFETY: same claim as above; only the first n samples are copied.
                    match self.shared.ring.region(offset, n) {
                        Ok(part) => unsafe { part.copy_in(&self.scratch[..n]) },
                        Err(e) => {
                            self.publish(head, 0);
                            return Err(e.into());
                        }
                    }
                }
                result
            }
        };

        match written {
            Ok(n) => {
                let n = n.min(max);
                self.publish(head, n);
                Ok(RingSpan { position: head, len: n })
            }
            Err(e) => {
                self.publish(head, 0);
                Err(e)
            }
        }
    }

    /// Copy `src` into the ring and publish it.
    pub fn write(&mut self, src: &[Sample]) -> Result<RingSpan, RingError> {
        self.fill(src.len(), |dst: &mut [Sample]| {
            dst.copy_from_slice(src);
            Ok::<_, RingError>(src.len())
        })
    }

    /// Reserve `[committed, committed + len)`, waiting for pinned windows inside
    /// the overwritten range to be released. Returns the start position.
    fn claim(&mut self, len: usize) -> u64 {
        let capacity = self.shared.ring.capacity() as u64;
        let mut cursor = self.shared.cursor.lock();
        let head = cursor.committed;
        let end = head + len as u64;
        cursor.claimed = end;

        // Positions below `floor` are overwritten by this claim.
        let floor = end.saturating_sub(capacity);
        loop {
            let blocked = cursor
                .pins
                .first_key_value()
                .is_some_and(|(&pinned, _)| pinned < floor);
            if !blocked {
                break;
            }
            self.stalls += 1;
            if self
                .shared
                .released
                .wait_for(&mut cursor, PIN_WAIT)
                .timed_out()
            {
                warn!(head, floor, "Ring writer waiting on a pinned window");
            }
        }
        head
    }

    fn publish(&mut self, head: u64, len: usize) {
        let mut cursor = self.shared.cursor.lock();
        cursor.committed = head + len as u64;
        cursor.claimed = cursor.committed;
        trace!(position = head, len, "Ring span published");
    }

    /// Absolute position the next write starts at.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.shared.cursor.lock().committed
    }

    /// Times the writer had to wait for a reader to release a window.
    #[must_use]
    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    /// A reader sharing this ring.
    #[must_use]
    pub fn reader(&self) -> RingReader {
        RingReader {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Ring capacity in samples.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.ring.capacity()
    }
}

impl fmt::Debug for RingWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingWriter")
            .field("ring", &self.shared.ring)
            .field("position", &self.position())
            .field("stalls", &self.stalls)
            .finish()
    }
}

/// Read access to windows published by a [`RingWriter`].
#[derive(Clone)]
pub struct RingReader {
    shared: Arc<Shared>,
}

impl RingReader {
    /// Run `f` over the samples at `[position, position + len)`.
    ///
    /// Returns `None` if the window is not fully written yet or has been
    /// (or is being) overwritten.
    pub fn read<R>(&self, position: u64, len: usize, f: impl FnOnce(&[Sample]) -> R) -> Option<R> {
        let capacity = self.shared.ring.capacity();
        if len > capacity {
            return None;
        }

        {
            let mut cursor = self.shared.cursor.lock();
            let end = position.checked_add(len as u64)?;
            if end > cursor.committed || position < cursor.claimed.saturating_sub(capacity as u64) {
                return None;
            }
            *cursor.pins.entry(position).or_insert(0) += 1;
        }
        let _pin = Pin {
            shared: &self.shared,
            position,
        };

        let offset = (position % capacity as u64) as usize;
        let region = self.shared.ring.region(offset, len).ok()?;
        // SAFETY: the pin keeps the writer out of this window while `f` runs.
        Some(unsafe { region.read_with(f) })
    }

    /// Whether `[position, position + len)` is currently readable.
    #[must_use]
    pub fn is_available(&self, position: u64, len: usize) -> bool {
        let capacity = self.shared.ring.capacity() as u64;
        let cursor = self.shared.cursor.lock();
        position + len as u64 <= cursor.committed
            && position >= cursor.claimed.saturating_sub(capacity)
    }

    /// Samples published so far.
    #[must_use]
    pub fn committed(&self) -> u64 {
        self.shared.cursor.lock().committed
    }

    /// Ring capacity in samples.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.ring.capacity()
    }

    /// Backend holding the samples.
    #[must_use]
    pub fn backend(&self) -> Backend {
        self.shared.ring.backend()
    }
}

impl fmt::Debug for RingReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingReader")
            .field("ring", &self.shared.ring)
            .finish()
    }
}

/// Releases a pin on drop, also when the reader's closure panics.
struct Pin<'a> {
    shared: &'a Shared,
    position: u64,
}

impl Drop for Pin<'_> {
    fn drop(&mut self) {
        let mut cursor = self.shared.cursor.lock();
        if let Some(count) = cursor.pins.get_mut(&self.position) {
            *count -= 1;
            if *count == 0 {
                cursor.pins.remove(&self.position);
            }
        }
        drop(cursor);
        self.shared.released.notify_all();
    }
}
