//! Lock-free waveform ring shared between the audio callback and the UI.
//!
//! The writer half lives on the audio thread and never blocks or allocates.
//! The reader half takes snapshots of the most recent samples. Samples are
//! stored as `f32` bit patterns in `AtomicU32` slots; torn reads (the writer
//! lapping the reader mid-copy) are detected with a claim counter and the
//! affected samples are replaced by zeros.

use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::ConfigError;

struct Shared {
    slots: Box<[AtomicU32]>,
    /// Samples published to readers.
    written: AtomicU64,
    /// Samples the writer has started to store. Always >= `written`.
    claimed: AtomicU64,
    channels: usize,
}

impl Shared {
    #[inline]
    fn capacity(&self) -> u64 {
        self.slots.len() as u64
    }

    #[inline]
    fn slot(&self, index: u64) -> &AtomicU32 {
        &self.slots[(index % self.capacity()) as usize]
    }
}

/// Create a ring holding the last `capacity` samples of one channel of an
/// interleaved stream with `channels` channels.
pub fn waveform_buffer(
    capacity: usize,
    channels: usize,
) -> Result<(WaveformWriter, WaveformReader), ConfigError> {
    if capacity == 0 {
        return Err(ConfigError::CapacityTooSmall {
            capacity,
            fft_size: 1,
        });
    }
    if channels == 0 {
        return Err(ConfigError::InvalidChannel {
            channel: 0,
            channels,
        });
    }

    let slots: Box<[AtomicU32]> = (0..capacity)
        .map(|_| AtomicU32::new(0.0f32.to_bits()))
        .collect();
    let shared = Arc::new(Shared {
        slots,
        written: AtomicU64::new(0),
        claimed: AtomicU64::new(0),
        channels,
    });

    Ok((
        WaveformWriter {
            shared: Arc::clone(&shared),
        },
        WaveformReader { shared },
    ))
}

/// Producer half. Not `Clone`: there is exactly one writer.
pub struct WaveformWriter {
    shared: Arc<Shared>,
}

impl WaveformWriter {
    /// Append the samples of `channel` from an interleaved block.
    ///
    /// Returns the number of samples appended; an out-of-range channel
    /// appends nothing. Oldest samples are overwritten once the ring is full.
    pub fn write(&mut self, samples: &[f32], channel: usize) -> usize {
        let channels = self.shared.channels;
        if channel >= channels || channel >= samples.len() {
            return 0;
        }
        let count = (samples.len() - channel).div_ceil(channels);
        self.store(samples.iter().skip(channel).step_by(channels).copied(), count)
    }

    /// Append a block that already contains a single channel.
    pub fn write_mono(&mut self, samples: &[f32]) -> usize {
        self.store(samples.iter().copied(), samples.len())
    }

    fn store(&mut self, samples: impl Iterator<Item = f32>, count: usize) -> usize {
        let shared = &*self.shared;
        // Only this half mutates the counters.
        let start = shared.written.load(Ordering::Relaxed);
        let end = start + count as u64;

        shared.claimed.store(end, Ordering::Relaxed);
        fence(Ordering::Release);

        let cap = shared.capacity();
        // Bursts longer than the ring only need their tail stored.
        let skip = (count as u64).saturating_sub(cap);
        for (index, sample) in (start + skip..end).zip(samples.skip(skip as usize)) {
            shared.slot(index).store(sample.to_bits(), Ordering::Relaxed);
        }

        shared.written.store(end, Ordering::Release);
        count
    }

    pub fn written(&self) -> u64 {
        self.shared.written.load(Ordering::Relaxed)
    }
}

/// Consumer half, held by the analysis side.
pub struct WaveformReader {
    shared: Arc<Shared>,
}

impl WaveformReader {
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    /// Total number of samples ever written.
    pub fn written(&self) -> u64 {
        self.shared.written.load(Ordering::Acquire)
    }

    /// The most recent `length` samples, zero-padded at the front.
    #[allow(dead_code)]
    pub fn snapshot(&self, length: usize) -> Vec<f32> {
        let mut out = vec![0.0; length];
        self.snapshot_into(&mut out);
        out
    }

    /// Fill `out` with the most recent `out.len()` samples without allocating.
    ///
    /// Retries a few times if the writer overtakes the copy; whatever is
    /// still torn after that is left as zeros.
    #[allow(dead_code)]
    pub fn snapshot_into(&self, out: &mut [f32]) -> usize {
        let mut valid = 0;
        for _ in 0..3 {
            let end = self.written();
            let wanted = (out.len() as u64).min(self.shared.capacity()).min(end) as usize;
            valid = self.snapshot_ending_at(end, out);
            if valid == wanted {
                break;
            }
        }
        valid
    }

    /// Fill `out` with the samples ending at absolute position `end`.
    ///
    /// `end` is clamped to [`written`](Self::written). Returns how many
    /// trailing samples of `out` are genuine; the rest are zeros, either
    /// because they were never written or because they have already been
    /// overwritten.
    pub fn snapshot_ending_at(&self, end: u64, out: &mut [f32]) -> usize {
        let shared = &*self.shared;
        let cap = shared.capacity();
        let end = end.min(self.written());
        let start = end
            .saturating_sub(out.len() as u64)
            .max(end.saturating_sub(cap));

        let valid = (end - start) as usize;
        let pad = out.len() - valid;
        out[..pad].fill(0.0);
        for (dst, index) in out[pad..].iter_mut().zip(start..end) {
            *dst = f32::from_bits(shared.slot(index).load(Ordering::Relaxed));
        }

        fence(Ordering::Acquire);
        let oldest_intact = shared.claimed.load(Ordering::Relaxed).saturating_sub(cap);
        if oldest_intact > start {
            let torn = ((oldest_intact - start) as usize).min(valid);
            out[pad..pad + torn].fill(0.0);
            return valid - torn;
        }
        valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn keeps_most_recent_samples() {
        let (mut writer, reader) = waveform_buffer(4, 1).unwrap();
        for sample in [1.0, 2.0, 3.0, 4.0, 5.0] {
            writer.write_mono(&[sample]);
        }
        assert_eq!(reader.snapshot(4), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn zero_pads_before_enough_samples() {
        let (mut writer, reader) = waveform_buffer(8, 1).unwrap();
        assert_eq!(reader.snapshot(4), vec![0.0; 4]);

        writer.write_mono(&[0.5, 0.25]);
        assert_eq!(reader.snapshot(4), vec![0.0, 0.0, 0.5, 0.25]);
    }

    #[test]
    fn snapshot_longer_than_capacity_is_padded() {
        let (mut writer, reader) = waveform_buffer(3, 1).unwrap();
        writer.write_mono(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(reader.snapshot(5), vec![0.0, 0.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn writes_selected_channel_of_interleaved_block() {
        let (mut writer, reader) = waveform_buffer(4, 2).unwrap();
        let block = [1.0, -1.0, 2.0, -2.0, 3.0, -3.0];

        assert_eq!(writer.write(&block, 1), 3);
        assert_eq!(reader.snapshot(3), vec![-1.0, -2.0, -3.0]);

        assert_eq!(writer.write(&block, 0), 3);
        assert_eq!(reader.snapshot(3), vec![1.0, 2.0, 3.0]);
        assert_eq!(reader.written(), 6);
    }

    #[test]
    fn out_of_range_channel_writes_nothing() {
        let (mut writer, reader) = waveform_buffer(4, 2).unwrap();
        assert_eq!(writer.write(&[1.0, 2.0], 2), 0);
        assert_eq!(reader.written(), 0);
    }

    #[test]
    fn snapshot_ending_at_reports_lost_history() {
        let (mut writer, reader) = waveform_buffer(4, 1).unwrap();
        writer.write_mono(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let mut out = [9.0; 3];
        // Positions 1..4 hold 2, 3, 4, but position 1 has been overwritten.
        assert_eq!(reader.snapshot_ending_at(4, &mut out), 2);
        assert_eq!(out, [0.0, 3.0, 4.0]);

        assert_eq!(reader.snapshot_ending_at(6, &mut out), 3);
        assert_eq!(out, [4.0, 5.0, 6.0]);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(waveform_buffer(0, 1).is_err());
        assert!(waveform_buffer(4, 0).is_err());
    }

    #[test]
    fn concurrent_reader_sees_contiguous_ramps() {
        let (mut writer, reader) = waveform_buffer(256, 1).unwrap();
        let total = 200_000u32;

        let producer = std::thread::spawn(move || {
            let mut next = 1u32;
            let mut block = [0.0f32; 37];
            while next <= total {
                let n = block.len().min((total - next + 1) as usize);
                for (i, slot) in block[..n].iter_mut().enumerate() {
                    *slot = (next + i as u32) as f32;
                }
                writer.write_mono(&block[..n]);
                next += n as u32;
            }
        });

        let mut out = vec![0.0f32; 128];
        while reader.written() < total as u64 {
            let valid = reader.snapshot_into(&mut out);
            let genuine = &out[out.len() - valid..];
            for pair in genuine.windows(2) {
                assert_eq!(pair[1], pair[0] + 1.0, "snapshot not contiguous: {:?}", pair);
            }
        }
        producer.join().unwrap();
        assert_eq!(*reader.snapshot(1).last().unwrap(), total as f32);
    }

    proptest! {
        #[test]
        fn only_last_capacity_samples_survive(
            capacity in 1usize..64,
            bursts in proptest::collection::vec(
                proptest::collection::vec(-1.0f32..1.0, 0..200),
                1..8,
            ),
        ) {
            let (mut writer, reader) = waveform_buffer(capacity, 1).unwrap();
            let mut history = Vec::new();
            for burst in &bursts {
                writer.write_mono(burst);
                history.extend_from_slice(burst);
            }

            let mut expected = vec![0.0f32; capacity];
            let tail = &history[history.len().saturating_sub(capacity)..];
            expected[capacity - tail.len()..].copy_from_slice(tail);

            prop_assert_eq!(reader.snapshot(capacity), expected);
            prop_assert_eq!(reader.written(), history.len() as u64);
        }
    }
}
