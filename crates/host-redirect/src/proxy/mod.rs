//! Reverse-proxy front: routing decision, upstream transport and relaying.

pub mod director;
pub mod forward;
pub mod local;
pub mod request_id;
pub mod transport;
pub mod upgrade;
pub mod upload;
