//! Registry of live subscribers.

mod error;
mod subscribers;

pub use error::{RegistryError, SendError};
pub use subscribers::{
    BroadcastReport, Registration, SubscriberHandle, SubscriberId, SubscriberRegistry,
    DEFAULT_SUBSCRIBER_BUFFER,
};
