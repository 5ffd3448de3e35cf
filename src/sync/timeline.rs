use std::collections::{HashMap, VecDeque};

use crate::models::{Message, MessageId};

/// Outcome of merging one message into the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// The id was new; the message now sits at the requested end.
    Inserted,
    /// The id was already present; the entry stayed where it was and
    /// only flags may have changed. Each field reports a flag that
    /// newly flipped on.
    Merged { delivered: bool, blocked: bool },
}

/// Ordered, deduplicated message sequence for one conversation.
///
/// Order is merge order: history pages arrive newest-first and are
/// merged entry by entry at the front, live arrivals go to the back, so
/// iteration always runs oldest to newest. The message id is the sole
/// dedup key, and an existing entry never moves, whichever path
/// re-delivers it.
#[derive(Debug, Default)]
pub struct Timeline {
    order: VecDeque<MessageId>,
    entries: HashMap<MessageId, Message>,
}

impl Timeline {
    pub fn new() -> Self {
        Timeline::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.entries.get(&id)
    }

    /// Messages oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.order.iter().map(|id| &self.entries[id])
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }

    /// Merges a history-page entry at the older end.
    pub fn merge_front(&mut self, message: Message) -> Merge {
        self.merge(message, true)
    }

    /// Merges a live arrival (stream event or send response) at the
    /// newer end.
    pub fn merge_back(&mut self, message: Message) -> Merge {
        self.merge(message, false)
    }

    fn merge(&mut self, message: Message, front: bool) -> Merge {
        if let Some(existing) = self.entries.get_mut(&message.id) {
            // Flags only ever accumulate; a copy arriving without one
            // never clears what a signal already set.
            let delivered = message.delivered && !existing.delivered;
            let blocked = message.blocked && !existing.blocked;
            existing.delivered |= message.delivered;
            existing.blocked |= message.blocked;
            return Merge::Merged { delivered, blocked };
        }
        if front {
            self.order.push_front(message.id);
        } else {
            self.order.push_back(message.id);
        }
        self.entries.insert(message.id, message);
        Merge::Inserted
    }

    /// Marks `id` delivered. `None` when the id is unknown, otherwise
    /// whether the flag newly flipped.
    pub fn set_delivered(&mut self, id: MessageId) -> Option<bool> {
        let entry = self.entries.get_mut(&id)?;
        let flipped = !entry.delivered;
        entry.delivered = true;
        Some(flipped)
    }

    /// Marks `id` blocked, same contract as [`set_delivered`](Self::set_delivered).
    pub fn set_blocked(&mut self, id: MessageId) -> Option<bool> {
        let entry = self.entries.get_mut(&id)?;
        let flipped = !entry.blocked;
        entry.blocked = true;
        Some(flipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn message(n: u128) -> Message {
        Message {
            id: Uuid::from_u128(n),
            author_id: Some(Uuid::from_u128(0xA0)),
            body: format!("message {n}"),
            created_at: Utc.with_ymd_and_hms(2024, 5, 12, 9, 0, 0).unwrap()
                + Duration::seconds(n as i64),
            delivered: false,
            blocked: false,
            service: false,
        }
    }

    fn ids(timeline: &Timeline) -> Vec<u128> {
        timeline.iter().map(|m| m.id.as_u128()).collect()
    }

    #[test]
    fn newest_first_page_merges_into_ascending_order() {
        let mut timeline = Timeline::new();
        for n in [3, 2, 1] {
            assert_eq!(timeline.merge_front(message(n)), Merge::Inserted);
        }
        assert_eq!(ids(&timeline), vec![1, 2, 3]);
    }

    #[test]
    fn older_page_extends_the_front_without_reordering() {
        let mut timeline = Timeline::new();
        for n in [6, 5, 4] {
            timeline.merge_front(message(n));
        }
        for n in [3, 2, 1] {
            timeline.merge_front(message(n));
        }
        assert_eq!(ids(&timeline), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn live_arrivals_append_at_the_back() {
        let mut timeline = Timeline::new();
        for n in [2, 1] {
            timeline.merge_front(message(n));
        }
        timeline.merge_back(message(3));
        assert_eq!(ids(&timeline), vec![1, 2, 3]);
    }

    #[test]
    fn duplicate_id_updates_flags_only() {
        let mut timeline = Timeline::new();
        for n in [3, 2, 1] {
            timeline.merge_front(message(n));
        }

        let mut copy = message(2);
        copy.delivered = true;
        assert_eq!(
            timeline.merge_back(copy),
            Merge::Merged {
                delivered: true,
                blocked: false
            }
        );
        // Entry 2 kept its position and picked up the flag.
        assert_eq!(ids(&timeline), vec![1, 2, 3]);
        assert!(timeline.get(Uuid::from_u128(2)).unwrap().delivered);

        // The same copy again flips nothing further.
        let mut again = message(2);
        again.delivered = true;
        assert_eq!(
            timeline.merge_front(again),
            Merge::Merged {
                delivered: false,
                blocked: false
            }
        );
    }

    #[test]
    fn flags_never_clear_once_set() {
        let mut timeline = Timeline::new();
        timeline.merge_back(message(1));
        assert_eq!(timeline.set_blocked(Uuid::from_u128(1)), Some(true));

        // A history copy without the flag leaves it standing.
        assert_eq!(
            timeline.merge_front(message(1)),
            Merge::Merged {
                delivered: false,
                blocked: false
            }
        );
        assert!(timeline.get(Uuid::from_u128(1)).unwrap().blocked);
    }

    #[test]
    fn acks_for_unknown_ids_report_none() {
        let mut timeline = Timeline::new();
        assert_eq!(timeline.set_delivered(Uuid::from_u128(9)), None);

        timeline.merge_back(message(9));
        assert_eq!(timeline.set_delivered(Uuid::from_u128(9)), Some(true));
        assert_eq!(timeline.set_delivered(Uuid::from_u128(9)), Some(false));
    }

    #[test]
    fn clear_forgets_everything() {
        let mut timeline = Timeline::new();
        timeline.merge_back(message(1));
        timeline.clear();
        assert!(timeline.is_empty());
        assert!(!timeline.contains(Uuid::from_u128(1)));
    }
}
