//! Groups sinks by identical output audio format.

use std::sync::Arc;

use crate::format::AudioFormat;
use crate::sink::Sink;

/// Sinks sharing one [`AudioFormat`]. The first entry parameterizes the
/// filter graph's `aformat` stage for this branch, as the "example sink".
pub struct SinkStack {
    sinks: Vec<Arc<Sink>>,
}

impl SinkStack {
    fn new(first: Arc<Sink>) -> Self {
        Self { sinks: vec![first] }
    }

    /// The format-defining sink for this stack's `aformat` stage.
    pub fn example(&self) -> &Arc<Sink> {
        &self.sinks[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Sink>> {
        self.sinks.iter()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Insertion is always at the head.
    fn push_front(&mut self, sink: Arc<Sink>) {
        self.sinks.insert(0, sink);
    }

    fn remove(&mut self, sink: &Arc<Sink>) {
        self.sinks.retain(|s| !Arc::ptr_eq(s, sink));
    }
}

/// One branch of the filter graph's fan-out: a format plus the stack of
/// sinks that share it.
pub struct SinkMapEntry {
    pub format: AudioFormat,
    pub stack: SinkStack,
}

/// Groups the playlist's attached sinks by format. Invariant: no two entries
/// share a format, and every entry's stack is non-empty (an entry whose
/// stack empties is removed on the spot).
#[derive(Default)]
pub struct SinkMap {
    entries: Vec<SinkMapEntry>,
}

impl SinkMap {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SinkMapEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SinkMapEntry> {
        self.entries.iter_mut()
    }

    /// Adds `sink` to the entry matching its format, creating a new entry at
    /// the head of the map if none matches. New entries and new stack
    /// members always go to the head, never the tail.
    pub fn add_sink(&mut self, sink: Arc<Sink>) {
        let format = sink.format();
        if let Some(entry) = self.entries.iter_mut().find(|e| e.format == format) {
            entry.stack.push_front(sink);
            return;
        }
        self.entries.insert(
            0,
            SinkMapEntry {
                format,
                stack: SinkStack::new(sink),
            },
        );
    }

    /// Removes `sink` from its entry; drops the entry entirely if it becomes empty.
    pub fn remove_sink(&mut self, sink: &Arc<Sink>) {
        for entry in self.entries.iter_mut() {
            entry.stack.remove(sink);
        }
        self.entries.retain(|e| !e.stack.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ChannelLayout, SampleFmt};

    fn fmt(rate: u32) -> AudioFormat {
        AudioFormat::new(rate, ChannelLayout::Stereo, SampleFmt::I16)
    }

    #[test]
    fn distinct_formats_create_distinct_entries() {
        let mut map = SinkMap::new();
        map.add_sink(Sink::create(fmt(44_100)));
        map.add_sink(Sink::create(fmt(48_000)));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn same_format_shares_one_entry() {
        let mut map = SinkMap::new();
        map.add_sink(Sink::create(fmt(44_100)));
        map.add_sink(Sink::create(fmt(44_100)));
        assert_eq!(map.len(), 1);
        assert_eq!(map.iter().next().unwrap().stack.len(), 2);
    }

    #[test]
    fn emptied_entry_is_removed() {
        let mut map = SinkMap::new();
        let sink = Sink::create(fmt(44_100));
        map.add_sink(sink.clone());
        map.remove_sink(&sink);
        assert!(map.is_empty());
    }

    #[test]
    fn new_entries_and_new_stack_members_prepend() {
        let mut map = SinkMap::new();
        let a = Sink::create(fmt(44_100));
        let b = Sink::create(fmt(48_000));
        map.add_sink(a.clone());
        map.add_sink(b.clone());
        // b's entry was inserted after a's, but at index 0.
        assert_eq!(map.iter().next().unwrap().format, fmt(48_000));

        let c = Sink::create(fmt(44_100));
        map.add_sink(c.clone());
        let a_entry = map.iter().find(|e| e.format == fmt(44_100)).unwrap();
        assert!(Arc::ptr_eq(a_entry.stack.example(), &c));
    }
}
