//! Transponder model and the per-session tag store.
//!
//! A [`TagSighting`] is one record parsed from an inventory line. The
//! [`TagStore`] folds sightings into [`Tag`]s keyed by ID, tracking how often
//! and when each tag was seen during the current inventory session.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Protocol-specific part of a transponder.
#[derive(Debug, Clone, PartialEq)]
pub enum TagKind {
    /// HF transponder whose air protocol was not reported.
    Hf,
    /// ISO 15693 transponder.
    Iso15 { dsfid: Option<u8> },
    /// ISO 14443-A transponder.
    Iso14a { sak: u8, atqa: u16 },
    /// UHF (EPC Gen2) transponder.
    Uhf { rssi: Option<i16> },
}

impl TagKind {
    pub fn is_uhf(&self) -> bool {
        matches!(self, TagKind::Uhf { .. })
    }
}

/// One transponder as aggregated over an inventory session.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    /// HF UID or UHF EPC, as hex text. Never empty.
    pub id: String,
    /// Secondary identifier (UHF TID), when the reader was asked for it.
    pub tid: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Number of sightings in this session, starting at 1.
    pub seen_count: u32,
    /// Antenna port that most recently detected the tag.
    pub antenna: Option<u8>,
    /// Memory read alongside detection.
    pub data: Option<String>,
    pub data_start_address: Option<u16>,
    /// Per-tag error reported in the inventory stream.
    pub error: Option<String>,
    pub kind: TagKind,
}

impl Tag {
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// The per-tag error message, or an empty string.
    pub fn message(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }

    /// RSSI for UHF tags that reported one.
    pub fn rssi(&self) -> Option<i16> {
        match self.kind {
            TagKind::Uhf { rssi } => rssi,
            _ => None,
        }
    }
}

/// A single tag record parsed from one inventory line.
#[derive(Debug, Clone, PartialEq)]
pub struct TagSighting {
    pub id: String,
    pub tid: Option<String>,
    pub antenna: Option<u8>,
    pub data: Option<String>,
    pub data_start_address: Option<u16>,
    pub error: Option<String>,
    pub kind: TagKind,
}

impl TagSighting {
    pub fn new(id: impl Into<String>, kind: TagKind) -> Self {
        TagSighting {
            id: id.into(),
            tid: None,
            antenna: None,
            data: None,
            data_start_address: None,
            error: None,
            kind,
        }
    }
}

/// Result of parsing one inventory line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryReport {
    pub sightings: Vec<TagSighting>,
    /// Set when the line closes a multiplex round for the given antenna.
    pub round_antenna: Option<u8>,
}

impl InventoryReport {
    pub fn is_empty(&self) -> bool {
        self.sightings.is_empty() && self.round_antenna.is_none()
    }
}

/// Tags seen during the current inventory session, in first-seen order.
#[derive(Debug, Default)]
pub struct TagStore {
    tags: Vec<Tag>,
    index: HashMap<String, usize>,
}

impl TagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sighting into the store and return the updated tag.
    pub fn record(&mut self, sighting: TagSighting, now: DateTime<Utc>) -> Tag {
        if let Some(&i) = self.index.get(&sighting.id) {
            let tag = &mut self.tags[i];
            tag.seen_count = tag.seen_count.saturating_add(1);
            if now > tag.last_seen {
                tag.last_seen = now;
            }
            if sighting.antenna.is_some() {
                tag.antenna = sighting.antenna;
            }
            if sighting.tid.is_some() {
                tag.tid = sighting.tid;
            }
            if sighting.data.is_some() {
                tag.data = sighting.data;
                tag.data_start_address = sighting.data_start_address;
            }
            tag.error = sighting.error;
            tag.kind = sighting.kind;
            return tag.clone();
        }

        let tag = Tag {
            id: sighting.id,
            tid: sighting.tid,
            first_seen: now,
            last_seen: now,
            seen_count: 1,
            antenna: sighting.antenna,
            data: sighting.data,
            data_start_address: sighting.data_start_address,
            error: sighting.error,
            kind: sighting.kind,
        };
        self.index.insert(tag.id.clone(), self.tags.len());
        self.tags.push(tag.clone());
        tag
    }

    pub fn get(&self, id: &str) -> Option<&Tag> {
        self.index.get(id).map(|&i| &self.tags[i])
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn clear(&mut self) {
        self.tags.clear();
        self.index.clear();
    }
}
