use std::time::Duration;

/// The topic every vote is published under.
pub const VOTES_TOPIC: &str = "votes";
/// The consumer channel counters share, so that scaled-out counters split
/// deliveries between them.
pub const COUNTER_CHANNEL: &str = "counter";

/// How often the tally is written to storage.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);
/// How long a stream connection is held before it is cycled.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(60);
/// Capacity of the buffer between the event source and the publisher.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
/// Messages a subscription may have outstanding at once.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Protocol magic written by every nsqd client on connect.
pub const NSQ_MAGIC_V2: &[u8; 4] = b"  V2";
/// Frame header: size followed by frame type.
pub const NSQ_FRAME_HEADER_SIZE: usize = 2 * std::mem::size_of::<u32>();
/// Message header: timestamp, attempts and message id.
pub const NSQ_MESSAGE_HEADER_SIZE: usize =
    // nanosecond timestamp
    std::mem::size_of::<i64>() +
        // attempts
        std::mem::size_of::<u16>() +
        // hex message id
        NSQ_MESSAGE_ID_SIZE;
pub const NSQ_MESSAGE_ID_SIZE: usize = 16;
/// nsqd rejects anything larger by default (`--max-msg-size`).
pub const NSQ_MAX_FRAME_SIZE: usize = 1024 * 1024;
