//! Pooled packet buffers shared between the pacer's producer and consumer.

mod packet;
pub use packet::*;
