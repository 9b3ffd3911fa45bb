//! Fuzz target: Weiss LabEvent reply parser
//!
//! Drives arbitrary byte sequences into `parse_reply` and asserts that it
//! never panics and that accepted values are well-formed.
//!
//! cargo fuzz run fuzz_weiss_reply

#![no_main]

use libfuzzer_sys::fuzz_target;
use thermocycle::adapters::weiss::{DELIM, Reply, parse_reply};

fuzz_target!(|data: &[u8]| {
    match parse_reply(data) {
        Ok(Reply::Ack) => {
            assert!(!data.contains(&DELIM), "ack must not carry a delimiter");
        }
        Ok(Reply::Value { .. }) => {
            assert!(data.contains(&DELIM), "value reply needs a delimiter");
        }
        Err(_) => {}
    }
});
