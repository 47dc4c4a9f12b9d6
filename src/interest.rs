use std::fmt;
use std::num::NonZeroU8;
use std::ops;

/// Interest used in registering.
///
/// Interest is used in conjunction with [`Poll`] to indicate the type of
/// events you want to receive along with the [`Token`] you'd like to
/// receive them with.
///
/// [`Poll`]: crate::Poll
/// [`Token`]: crate::Token
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Interest(NonZeroU8);

const READABLE: u8 = 0b0001;
const WRITABLE: u8 = 0b0010;
const PRIORITY: u8 = 0b0100;

impl Interest {
    /// Interest for readable events, this includes half closed connections.
    pub const READABLE: Interest = Interest(unsafe { NonZeroU8::new_unchecked(READABLE) });

    /// Interest for writable events.
    pub const WRITABLE: Interest = Interest(unsafe { NonZeroU8::new_unchecked(WRITABLE) });

    /// Interest for high priority read events, i.e. OOB data on a TCP
    /// socket.
    pub const PRIORITY: Interest = Interest(unsafe { NonZeroU8::new_unchecked(PRIORITY) });

    /// Returns true if the value includes readable interest.
    #[inline]
    pub const fn is_readable(self) -> bool {
        (self.0.get() & READABLE) != 0
    }

    /// Returns true if the value includes writable interest.
    #[inline]
    pub const fn is_writable(self) -> bool {
        (self.0.get() & WRITABLE) != 0
    }

    /// Returns true if `self` contains priority interest.
    #[inline]
    pub const fn is_priority(self) -> bool {
        (self.0.get() & PRIORITY) != 0
    }

    /// Add together two `Interest` values.
    ///
    /// This does the same thing as the `BitOr` implementation, but is
    /// usable in a `const` function.
    pub const fn add(self, other: Interest) -> Interest {
        Interest(unsafe { NonZeroU8::new_unchecked(self.0.get() | other.0.get()) })
    }

    /// Removes `other` from `self`, returns `None` if the set would be
    /// empty.
    pub const fn remove(self, other: Interest) -> Option<Interest> {
        NonZeroU8::new(self.0.get() & !other.0.get()).map(Interest)
    }
}

impl ops::BitOr for Interest {
    type Output = Self;

    #[inline]
    fn bitor(self, other: Self) -> Self {
        self.add(other)
    }
}

impl ops::BitOrAssign for Interest {
    #[inline]
    fn bitor_assign(&mut self, other: Self) {
        self.0 = (*self | other).0;
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut one_written = false;
        if self.is_readable() {
            write!(f, "READABLE")?;
            one_written = true;
        }
        if self.is_writable() {
            if one_written {
                write!(f, "|")?;
            }
            write!(f, "WRITABLE")?;
            one_written = true;
        }
        if self.is_priority() {
            if one_written {
                write!(f, "|")?;
            }
            write!(f, "PRIORITY")?;
        }
        Ok(())
    }
}
