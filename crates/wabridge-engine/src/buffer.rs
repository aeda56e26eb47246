// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded, ordered event buffer with cursor reads, and the dedup window
//! that guards it.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use wabridge_core::{BridgeError, InboundEvent, MessageId};

/// One page returned by [`EventBuffer::read`].
#[derive(Debug, Clone, Serialize)]
pub struct BufferPage {
    pub events: Vec<Arc<InboundEvent>>,
    /// Cursor to pass as `after` on the next poll.
    pub next_cursor: u64,
    /// Sequence number of the oldest retained event, if any.
    pub oldest_seq: Option<u64>,
    /// More events are retained beyond this page.
    pub has_more: bool,
}

/// Capacity- and age-bounded ring of inbound events for one session.
///
/// Sequence numbers start at 1, increase strictly in arrival order, and are
/// never reused. Eviction only ever removes from the front.
#[derive(Debug)]
pub struct EventBuffer {
    events: VecDeque<Arc<InboundEvent>>,
    capacity: usize,
    max_age: Duration,
    next_seq: u64,
    /// Highest sequence number that is no longer retained.
    evicted_through: u64,
}

impl EventBuffer {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            max_age,
            next_seq: 1,
            evicted_through: 0,
        }
    }

    /// Appends an event built around the next sequence number, evicting the
    /// oldest entry once capacity is exceeded. Never blocks.
    pub fn push(&mut self, build: impl FnOnce(u64) -> InboundEvent) -> Arc<InboundEvent> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let event = Arc::new(build(seq));
        self.events.push_back(Arc::clone(&event));
        while self.events.len() > self.capacity {
            self.pop_front();
        }
        event
    }

    fn pop_front(&mut self) -> Option<Arc<InboundEvent>> {
        let evicted = self.events.pop_front()?;
        self.evicted_through = evicted.seq;
        Some(evicted)
    }

    /// Drops events received longer than `max_age` ago. Returns the number
    /// of evicted events.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(self.max_age) else {
            return 0;
        };
        let cutoff = now - max_age;
        let mut evicted = 0;
        while self
            .events
            .front()
            .is_some_and(|event| event.received_at < cutoff)
        {
            self.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Reads up to `limit` events with a sequence number greater than `after`.
    ///
    /// `None` reads from the oldest retained event (a full snapshot when
    /// `limit` covers the buffer). Fails with [`BridgeError::CursorTooOld`]
    /// when events after the cursor have already been evicted.
    pub fn read(&self, after: Option<u64>, limit: usize) -> Result<BufferPage, BridgeError> {
        let after = match after {
            Some(cursor) if cursor < self.evicted_through => {
                return Err(BridgeError::CursorTooOld {
                    requested: cursor,
                    oldest: self.evicted_through + 1,
                });
            }
            Some(cursor) => cursor,
            None => self.evicted_through,
        };

        // Sequence numbers are contiguous inside the ring, so the start
        // index follows from the front entry.
        let start = match self.events.front() {
            Some(front) if after >= front.seq => (after - front.seq + 1) as usize,
            _ => 0,
        };
        let events: Vec<_> = self
            .events
            .iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect();
        let has_more = start.saturating_add(events.len()) < self.events.len();
        let next_cursor = events.last().map_or(after, |event| event.seq);

        Ok(BufferPage {
            events,
            next_cursor,
            oldest_seq: self.oldest_seq(),
            has_more,
        })
    }

    /// Looks up a retained event by sequence number.
    pub fn get(&self, seq: u64) -> Option<Arc<InboundEvent>> {
        let front = self.events.front()?.seq;
        let index = usize::try_from(seq.checked_sub(front)?).ok()?;
        self.events.get(index).cloned()
    }

    /// Replaces a retained event in place (media resolution). Returns the
    /// new event, or `None` when it was evicted meanwhile.
    pub fn update(
        &mut self,
        seq: u64,
        f: impl FnOnce(&mut InboundEvent),
    ) -> Option<Arc<InboundEvent>> {
        let front = self.events.front()?.seq;
        let index = usize::try_from(seq.checked_sub(front)?).ok()?;
        let slot = self.events.get_mut(index)?;
        let mut event = (**slot).clone();
        f(&mut event);
        *slot = Arc::new(event);
        Some(Arc::clone(slot))
    }

    /// Empties the buffer. Every sequence number handed out so far counts as
    /// evicted, so stale cursors surface as [`BridgeError::CursorTooOld`].
    pub fn clear(&mut self) {
        self.events.clear();
        self.evicted_through = self.next_seq - 1;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn oldest_seq(&self) -> Option<u64> {
        self.events.front().map(|event| event.seq)
    }

    /// Last sequence number handed out, `0` before the first event.
    pub fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }
}

/// Bounded window of recently appended message ids.
#[derive(Debug)]
pub struct DedupWindow {
    seen: HashSet<MessageId>,
    order: VecDeque<MessageId>,
    capacity: usize,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }

    /// Records an id. Returns `false` when it was already present.
    pub fn insert(&mut self, id: MessageId) -> bool {
        if !self.seen.insert(id.clone()) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.seen.remove(&old);
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use wabridge_core::{ContentKind, EventBody, RawPayload, SessionId};

    fn event_at(seq: u64, id: &str, received_at: DateTime<Utc>) -> InboundEvent {
        InboundEvent {
            seq,
            session_id: SessionId::from("default"),
            account: "default".into(),
            account_number: None,
            message_id: MessageId(id.to_string()),
            sender_jid: "491234@s.whatsapp.net".into(),
            sender_number: "491234".into(),
            sender_name: None,
            chat_jid: "491234@s.whatsapp.net".into(),
            is_group: false,
            from_me: false,
            timestamp: None,
            received_at,
            kind: ContentKind::Text,
            body: EventBody::Text { text: id.into() },
            media: None,
            raw: RawPayload::new(serde_json::Value::Null),
        }
    }

    fn push(buffer: &mut EventBuffer, id: &str) -> u64 {
        buffer.push(|seq| event_at(seq, id, Utc::now())).seq
    }

    fn seqs(page: &BufferPage) -> Vec<u64> {
        page.events.iter().map(|e| e.seq).collect()
    }

    #[test]
    fn sequences_start_at_one() {
        let mut buffer = EventBuffer::new(10, Duration::from_secs(60));
        assert_eq!(buffer.last_seq(), 0);
        assert_eq!(push(&mut buffer, "a"), 1);
        assert_eq!(push(&mut buffer, "b"), 2);
        assert_eq!(buffer.last_seq(), 2);
    }

    #[test]
    fn read_after_cursor_with_paging() {
        let mut buffer = EventBuffer::new(10, Duration::from_secs(60));
        for id in ["a", "b", "c", "d"] {
            push(&mut buffer, id);
        }

        let page = buffer.read(None, 2).unwrap();
        assert_eq!(seqs(&page), vec![1, 2]);
        assert!(page.has_more);
        assert_eq!(page.next_cursor, 2);

        let page = buffer.read(Some(page.next_cursor), 10).unwrap();
        assert_eq!(seqs(&page), vec![3, 4]);
        assert!(!page.has_more);

        let page = buffer.read(Some(4), 10).unwrap();
        assert!(page.events.is_empty());
        assert_eq!(page.next_cursor, 4);

        // A cursor ahead of the buffer simply yields nothing.
        assert!(buffer.read(Some(99), 10).unwrap().events.is_empty());
    }

    #[test]
    fn capacity_eviction_reports_cursor_too_old() {
        let mut buffer = EventBuffer::new(3, Duration::from_secs(60));
        for id in ["a", "b", "c", "d", "e"] {
            push(&mut buffer, id);
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.oldest_seq(), Some(3));

        // Cursor 2 has seen 1..=2, and 3 is still retained.
        assert_eq!(seqs(&buffer.read(Some(2), 10).unwrap()), vec![3, 4, 5]);

        let err = buffer.read(Some(1), 10).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::CursorTooOld {
                requested: 1,
                oldest: 3
            }
        ));
    }

    #[test]
    fn age_eviction() {
        let mut buffer = EventBuffer::new(10, Duration::from_secs(60));
        let now = Utc::now();
        buffer.push(|seq| event_at(seq, "old", now - chrono::Duration::seconds(120)));
        buffer.push(|seq| event_at(seq, "new", now));

        assert_eq!(buffer.prune_expired(now), 1);
        assert_eq!(buffer.oldest_seq(), Some(2));
        assert!(buffer.read(Some(0), 10).is_err());
    }

    #[test]
    fn clear_keeps_sequence_and_invalidates_cursors() {
        let mut buffer = EventBuffer::new(10, Duration::from_secs(60));
        push(&mut buffer, "a");
        push(&mut buffer, "b");
        buffer.clear();

        assert!(buffer.is_empty());
        assert!(buffer.read(Some(1), 10).is_err());
        assert!(buffer.read(None, 10).unwrap().events.is_empty());
        assert_eq!(push(&mut buffer, "c"), 3);
        assert_eq!(seqs(&buffer.read(Some(2), 10).unwrap()), vec![3]);
    }

    #[test]
    fn update_replaces_in_place() {
        let mut buffer = EventBuffer::new(10, Duration::from_secs(60));
        push(&mut buffer, "a");
        push(&mut buffer, "b");
        let updated = buffer
            .update(2, |event| event.sender_name = Some("Alice".into()))
            .unwrap();
        assert_eq!(updated.sender_name.as_deref(), Some("Alice"));
        assert_eq!(
            buffer.get(2).unwrap().sender_name.as_deref(),
            Some("Alice")
        );
        assert!(buffer.update(7, |_| {}).is_none());
    }

    #[test]
    fn dedup_window_forgets_oldest() {
        let mut window = DedupWindow::new(2);
        assert!(window.insert(MessageId("a".into())));
        assert!(!window.insert(MessageId("a".into())));
        assert!(window.insert(MessageId("b".into())));
        assert!(window.insert(MessageId("c".into())));
        assert!(!window.contains(&MessageId("a".into())));
        assert!(window.contains(&MessageId("c".into())));
        assert_eq!(window.len(), 2);
    }

    proptest! {
        #[test]
        fn sequences_strictly_increase_in_arrival_order(
            ids in proptest::collection::vec("[a-z]{1,4}", 1..200),
            capacity in 1usize..50,
        ) {
            let mut buffer = EventBuffer::new(capacity, Duration::from_secs(3600));
            for id in &ids {
                push(&mut buffer, id);
            }
            let page = buffer.read(None, usize::MAX).unwrap();
            prop_assert!(page.events.len() <= capacity);
            prop_assert!(page.events.windows(2).all(|w| w[0].seq + 1 == w[1].seq));

            // The retained tail is exactly the last arrivals, in order.
            let tail: Vec<_> = ids.iter().rev().take(page.events.len()).rev().cloned().collect();
            let got: Vec<_> = page.events.iter().map(|e| e.message_id.0.clone()).collect();
            prop_assert_eq!(got, tail);
        }

        #[test]
        fn dedup_admits_each_id_once(
            ids in proptest::collection::vec("[a-f]{1,2}", 1..300),
        ) {
            let mut buffer = EventBuffer::new(1000, Duration::from_secs(3600));
            let mut window = DedupWindow::new(4096);
            for id in &ids {
                let id = MessageId(id.clone());
                if !window.contains(&id) {
                    push(&mut buffer, &id.0);
                    window.insert(id);
                }
            }
            let unique: HashSet<_> = ids.iter().collect();
            prop_assert_eq!(buffer.len(), unique.len());
        }
    }
}
