use std::io;
use std::os::unix::io::RawFd;

use crate::{event, poll, Interest, Registry, Token};

/// Adapter registering a bare [`RawFd`] with [`Registry`].
///
/// `SourceFd` does not take ownership of the descriptor: nothing about
/// registering or deregistering it closes the fd. It exists so a
/// connection record can reregister its descriptor's interest (e.g. to
/// start or stop watching for writability) without needing `&mut` access
/// to the socket value itself, which a descriptor shared behind an `Arc`
/// cannot offer.
#[derive(Debug)]
pub(crate) struct SourceFd<'a>(pub(crate) &'a RawFd);

impl<'a> event::Source for SourceFd<'a> {
    fn register(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        poll::selector(registry).register(*self.0, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        poll::selector(registry).reregister(*self.0, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        poll::selector(registry).deregister(*self.0)
    }
}
