//! Bounded collections used by the runtime queues.

mod ring_buffer;

pub use ring_buffer::RingBuffer;
