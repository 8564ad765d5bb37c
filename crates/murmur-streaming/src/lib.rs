pub mod connection;
pub mod hub;
pub mod publisher;
pub mod redis_transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use hub::Hub;
pub use publisher::{PublishBatch, Publisher};
pub use redis_transport::{RedisPublisher, relay_to_hub};
