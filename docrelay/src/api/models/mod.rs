//! Request data structures for the inbound API.

pub mod uploads;
