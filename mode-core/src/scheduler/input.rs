//! Keyboard input polled once per tick.

/// A key press delivered by an [`InputSource`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Key {
    Char(char),
    Enter,
    Escape,
}

/// Non-blocking keyboard poll.
pub trait InputSource {
    /// Returns the next pending key press, if any.
    fn poll(&mut self) -> Option<Key>;
}

impl<F> InputSource for F
where
    F: FnMut() -> Option<Key>,
{
    fn poll(&mut self) -> Option<Key> {
        self()
    }
}
