//! Domain types shared by every tripwire crate: rules, alert instances,
//! channels, notification attempts, suppressions and analytics buckets.

pub mod id;
pub mod types;

#[cfg(test)]
mod tests;
