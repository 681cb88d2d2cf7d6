//! Fuzz target for ring buffer windows.
//!
//! Drives a ring through arbitrary writes and window reads, comparing every
//! window with a model that keeps the full written history:
//! - windows that cross the end read back in stream order
//! - lapped windows are refused, unwritten ones too
//! - both backends agree with the model

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use scan_core::Sample;
use scan_ring::{split, RingBuffer};

#[derive(Debug, Arbitrary)]
struct WindowInput {
    /// Extra pages of capacity beyond the first
    extra_pages: u8,
    /// Use the heap backend instead of the mirrored one
    copy_on_wrap: bool,
    operations: Vec<WindowOp>,
}

#[derive(Debug, Clone, Arbitrary)]
enum WindowOp {
    /// Append this many samples
    Write { len: u16 },
    /// Read `len` samples starting `back` samples before the write position
    Read { back: u32, len: u16 },
}

fuzz_target!(|input: WindowInput| {
    let capacity = RingBuffer::capacity_for(1) * (1 + usize::from(input.extra_pages % 4));
    let ring = if input.copy_on_wrap {
        RingBuffer::copy_on_wrap(capacity)
    } else {
        RingBuffer::new(capacity)
    };
    let Ok(ring) = ring else {
        return;
    };
    let (mut writer, reader) = split(ring);

    let mut history: Vec<Sample> = Vec::new();

    for op in input.operations.iter().take(256) {
        match *op {
            WindowOp::Write { len } => {
                let len = usize::from(len) % (capacity + 1);
                let start = history.len();
                let src: Vec<Sample> = (start..start + len)
                    .map(|i| Sample::new(i as f32, -(i as f32)))
                    .collect();
                let span = writer.write(&src).expect("write within capacity");
                assert_eq!(span.position, start as u64);
                assert_eq!(span.len, len);
                history.extend_from_slice(&src);
            }
            WindowOp::Read { back, len } => {
                let len = usize::from(len);
                let end = history.len() as u64;
                let position = end.saturating_sub(u64::from(back));
                let got = reader.read(position, len, <[Sample]>::to_vec);

                let fits = len <= capacity;
                let written = position + len as u64 <= end;
                let retained = end - position <= capacity as u64;
                if len > 0 && fits && written && retained {
                    let start = position as usize;
                    assert_eq!(got.as_deref(), Some(&history[start..start + len]));
                } else if len > 0 {
                    assert!(got.is_none(), "window {position}+{len} should be refused");
                }
            }
        }
    }

    assert_eq!(reader.committed(), history.len() as u64);
});
