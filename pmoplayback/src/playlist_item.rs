//! Doubly-linked playlist node.

use std::sync::{Arc, Mutex, Weak};

use crate::decoded_stream::DecodedStream;

/// One entry in a [`crate::playlist::Playlist`]: a decodable file plus its
/// per-item gain and its links to its neighbors.
///
/// The Playlist exclusively owns the forward link (`next: Arc`); `prev` is a
/// `Weak` back-reference so the list does not form a reference cycle.
/// Linkage mutation happens only under the Playlist mutex, but `gain` is
/// read far more often than it's written (every decode iteration reads it to
/// compute the composite volume) and is cheap to guard on its own. `file` is
/// a `tokio::sync::Mutex` rather than `std::sync::Mutex`: the decoder loop
/// calls `DecodedStream`'s async `seek`/`next_chunk` while holding it, which
/// a std guard can't survive across an `.await`.
pub struct PlaylistItemInner {
    pub file: tokio::sync::Mutex<Box<dyn DecodedStream>>,
    gain: Mutex<f64>,
    pub(crate) prev: Mutex<Option<Weak<PlaylistItemInner>>>,
    pub(crate) next: Mutex<Option<Arc<PlaylistItemInner>>>,
}

impl PlaylistItemInner {
    pub fn new(file: Box<dyn DecodedStream>, gain: f64) -> Arc<Self> {
        Arc::new(Self {
            file: tokio::sync::Mutex::new(file),
            gain: Mutex::new(gain),
            prev: Mutex::new(None),
            next: Mutex::new(None),
        })
    }

    pub fn gain(&self) -> f64 {
        *self.gain.lock().unwrap()
    }

    pub fn set_gain(&self, gain: f64) {
        *self.gain.lock().unwrap() = gain;
    }

    pub(crate) fn next(&self) -> Option<Arc<PlaylistItemInner>> {
        self.next.lock().unwrap().clone()
    }

    pub(crate) fn prev(&self) -> Option<Arc<PlaylistItemInner>> {
        self.prev.lock().unwrap().as_ref().and_then(Weak::upgrade)
    }
}

/// Opaque handle returned to callers of `Playlist::insert`; identity is by
/// `Arc` pointer, never dereferenced by callers outside the crate.
#[derive(Clone)]
pub struct PlaylistItemHandle {
    pub(crate) inner: Arc<PlaylistItemInner>,
}

impl PlaylistItemHandle {
    pub(crate) fn new(inner: Arc<PlaylistItemInner>) -> Self {
        Self { inner }
    }

    pub fn gain(&self) -> f64 {
        self.inner.gain()
    }

    pub(crate) fn ptr_eq(&self, other: &Arc<PlaylistItemInner>) -> bool {
        Arc::ptr_eq(&self.inner, other)
    }

    /// Identity comparison between two handles to the same playlist item.
    pub fn is(&self, other: &PlaylistItemHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
impl PlaylistItemInner {
    /// Builds a minimally-valid item around a `MockStream`, for tests that
    /// only need a stable `Arc<PlaylistItemInner>` identity (e.g. `Buffer`'s
    /// weak back-reference tests).
    pub fn for_test() -> Arc<Self> {
        use crate::decoded_stream::tests::MockStream;
        PlaylistItemInner::new(Box::new(MockStream::new(44_100, 1.0)), 1.0)
    }
}
