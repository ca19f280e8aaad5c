//! DNS front: override answers for routed hostnames, recursive fallback for
//! everything else.

pub mod decision;
pub mod resolver;
pub mod server;

pub use resolver::SystemResolver;
pub use server::DnsFront;
