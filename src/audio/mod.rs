//! Audio capture, sample transport, and WAV encoding.

pub mod capture;
pub mod wav;

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// Sample rate of the processing pipeline and of uploaded payloads.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Ring capacity: ~10 seconds of 16 kHz mono audio.
const RING_CAPACITY: usize = 160_000;

/// Producer half of the capture ring; lives in the cpal audio callback.
pub struct SampleProducer {
    inner: ringbuf::HeapProd<f32>,
}

/// Consumer half; drained by the capture session's polling loop.
pub struct SampleConsumer {
    inner: ringbuf::HeapCons<f32>,
}

/// Lock-free SPSC pair carrying samples out of the audio callback.
pub fn sample_ring() -> (SampleProducer, SampleConsumer) {
    let (prod, cons) = HeapRb::<f32>::new(RING_CAPACITY).split();
    (SampleProducer { inner: prod }, SampleConsumer { inner: cons })
}

impl SampleProducer {
    /// Push samples, returning how many were accepted. The rest are dropped
    /// when the ring is full; the polling loop will catch up.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        self.inner.push_slice(samples)
    }
}

// Safety: each half moves to exactly one thread. The producer goes into the
// cpal callback thread, the consumer into the capture session's task.
unsafe impl Send for SampleProducer {}
unsafe impl Send for SampleConsumer {}

impl SampleConsumer {
    /// Take everything currently buffered, in arrival order.
    pub fn drain(&mut self) -> Vec<f32> {
        let n = self.inner.occupied_len();
        if n == 0 {
            return Vec::new();
        }
        let mut buf = vec![0.0f32; n];
        let read = self.inner.pop_slice(&mut buf);
        buf.truncate(read);
        buf
    }
}
