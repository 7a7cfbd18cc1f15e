//! Test suites for the duplex host.

pub(crate) mod support;
