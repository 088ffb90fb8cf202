//! Placeholder attachment for the two-phase attach window.

use std::os::unix::io::RawFd;

use evloop_core::{Interest, Result};

use super::Context;
use crate::selector::ReadyEvent;

/// Inert context attached between `register` and `attach`.
///
/// The accept path registers with the empty interest set and swaps the
/// stub out before returning to the dispatcher, so no event can reach it.
/// One that does is an ordering bug and panics.
#[derive(Debug, Default, Clone, Copy)]
pub struct EstablishedContextStub;

impl EstablishedContextStub {
    pub fn new() -> Self {
        EstablishedContextStub
    }
}

impl Context for EstablishedContextStub {
    fn handle_event(&self, event: &ReadyEvent) -> Result<()> {
        panic!(
            "readiness {} delivered to placeholder context (token {}): stub must be replaced before dispatch",
            event.ready(),
            event.key().token()
        );
    }

    fn close(&self) {}

    fn channel_fd(&self) -> RawFd {
        panic!("placeholder context owns no channel");
    }

    fn initial_interest(&self) -> Interest {
        Interest::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_is_inert() {
        let stub = EstablishedContextStub::new();
        assert!(stub.initial_interest().is_empty());
        stub.close();
        stub.close();
    }

    #[test]
    #[should_panic(expected = "placeholder context owns no channel")]
    fn test_stub_channel_panics() {
        EstablishedContextStub.channel_fd();
    }
}
