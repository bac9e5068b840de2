use chrono::{DateTime, Utc};
use mcpanel_protocol::v1::event::Announcement;

use crate::utils::BoundedFifo;

pub const MAX_ANNOUNCEMENTS: usize = 10;
const DEFAULT_KIND: &str = "info";

/// Operator announcements, newest last. Ids are millisecond timestamps,
/// bumped when two announcements land in the same millisecond.
pub struct Announcements {
    items: BoundedFifo<Announcement>,
    last_id: u64,
}

impl Default for Announcements {
    fn default() -> Self {
        Self::new()
    }
}

impl Announcements {
    pub fn new() -> Self {
        Self {
            items: BoundedFifo::new(MAX_ANNOUNCEMENTS),
            last_id: 0,
        }
    }

    pub fn add(&mut self, text: &str, kind: Option<&str>) -> Announcement {
        self.add_at(text, kind, Utc::now())
    }

    pub fn add_at(&mut self, text: &str, kind: Option<&str>, now: DateTime<Utc>) -> Announcement {
        let id = (now.timestamp_millis().max(0) as u64).max(self.last_id + 1);
        self.last_id = id;
        let announcement = Announcement {
            id,
            text: text.to_string(),
            kind: kind
                .filter(|k| !k.is_empty())
                .unwrap_or(DEFAULT_KIND)
                .to_string(),
            time: now,
        };
        self.items.push(announcement.clone());
        announcement
    }

    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.items.len();
        self.items.retain(|a| a.id != id);
        before != self.items.len()
    }

    pub fn to_vec(&self) -> Vec<Announcement> {
        self.items.iter().cloned().collect()
    }
}
