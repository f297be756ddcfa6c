//! Mutable per-connection state of a reader.
//!
//! One [`SessionState`] exists per reader instance, behind a single
//! `tokio::sync::Mutex` shared by the IO task (inventory and input events)
//! and the session state machine (command completions).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::tag::{InventoryReport, Tag, TagSighting, TagStore};
use crate::types::{AntennaMode, ConnectionState, ReaderIdentity};

/// Shared handle to a reader's session state.
pub type SharedSession = Arc<Mutex<SessionState>>;

/// Distinct tags held back while a multiplex round is open.
pub const MAX_PENDING_ROUND: usize = 1024;

/// A tag waiting for its round marker, with how often it was read.
#[derive(Debug)]
struct PendingSighting {
    sighting: TagSighting,
    reads: u32,
}

#[derive(Debug)]
pub struct SessionState {
    pub state: ConnectionState,
    pub identity: Option<ReaderIdentity>,
    antenna: AntennaMode,
    /// Heartbeat interval negotiated during initialization, in seconds.
    pub heartbeat_secs: u32,
    pub input_events_enabled: bool,
    /// Last known input levels, indexed by pin - 1.
    pub inputs: Vec<Option<bool>>,
    pub tags: TagStore,
    /// Sightings waiting for the end of the current multiplex round.
    pending_round: Vec<PendingSighting>,
}

impl SessionState {
    pub fn new(input_pins: u8) -> Self {
        SessionState {
            state: ConnectionState::Disconnected,
            identity: None,
            antenna: AntennaMode::Single(1),
            heartbeat_secs: 0,
            input_events_enabled: false,
            inputs: vec![None; input_pins as usize],
            tags: TagStore::new(),
            pending_round: Vec::new(),
        }
    }

    pub fn shared(input_pins: u8) -> SharedSession {
        Arc::new(Mutex::new(Self::new(input_pins)))
    }

    pub fn antenna(&self) -> &AntennaMode {
        &self.antenna
    }

    /// Record the antenna configuration. Sightings buffered for an open
    /// multiplex round are dropped when the mode changes.
    pub fn set_antenna_mode(&mut self, mode: AntennaMode) {
        if self.antenna != mode && !self.pending_round.is_empty() {
            debug!(dropped = self.pending_round.len(), "antenna mode changed, discarding open round");
            self.pending_round.clear();
        }
        self.antenna = mode;
    }

    /// The antenna port in single mode.
    pub fn current_antenna(&self) -> Option<u8> {
        match self.antenna {
            AntennaMode::Single(port) => Some(port),
            AntennaMode::Multiplex(_) => None,
        }
    }

    pub fn set_input(&mut self, pin: u8, high: bool) {
        let idx = pin.saturating_sub(1) as usize;
        if idx >= self.inputs.len() {
            self.inputs.resize(idx + 1, None);
        }
        self.inputs[idx] = Some(high);
    }

    /// Start a fresh inventory session.
    pub fn clear_tags(&mut self) {
        self.tags.clear();
        self.pending_round.clear();
    }

    /// Fold an inventory report into the tag store.
    ///
    /// In single-antenna mode sightings are applied immediately and tagged
    /// with the current antenna. In multiplex mode sightings without an
    /// explicit antenna wait for the round marker, which names the antenna
    /// that produced them. Returns the tags touched by this report.
    pub fn apply_inventory(&mut self, report: InventoryReport, now: DateTime<Utc>) -> Vec<Tag> {
        let mut touched = Vec::new();
        match self.antenna.clone() {
            AntennaMode::Single(port) => {
                for mut sighting in report.sightings {
                    sighting.antenna.get_or_insert(port);
                    touched.push(self.tags.record(sighting, now));
                }
            }
            AntennaMode::Multiplex(_) => {
                for sighting in report.sightings {
                    if sighting.antenna.is_some() {
                        touched.push(self.tags.record(sighting, now));
                    } else {
                        self.hold_for_round(sighting);
                    }
                }
                if let Some(port) = report.round_antenna {
                    debug!(port, pending = self.pending_round.len(), "multiplex round finished");
                    for pending in std::mem::take(&mut self.pending_round) {
                        let mut sighting = pending.sighting;
                        sighting.antenna = Some(port);
                        touched.push(self.record_reads(sighting, pending.reads, now));
                    }
                }
            }
        }
        touched
    }

    /// Fold a complete report into the tag store without waiting for a
    /// round marker, as for the reply of a single-shot inventory.
    ///
    /// Sightings keep their own antenna, fall back to the current port in
    /// single mode, and stay without one in multiplex mode.
    pub fn apply_inventory_now(&mut self, report: InventoryReport, now: DateTime<Utc>) -> Vec<Tag> {
        let port = self.current_antenna();
        report
            .sightings
            .into_iter()
            .map(|mut sighting| {
                if sighting.antenna.is_none() {
                    sighting.antenna = port;
                }
                self.tags.record(sighting, now)
            })
            .collect()
    }

    /// Mark the link as gone. Returns false if it already was.
    pub fn mark_disconnected(&mut self) -> bool {
        if self.state == ConnectionState::Disconnected {
            return false;
        }
        self.state = ConnectionState::Disconnected;
        self.clear_tags();
        true
    }

    fn hold_for_round(&mut self, sighting: TagSighting) {
        if let Some(pending) = self.pending_round.iter_mut().find(|p| p.sighting.id == sighting.id) {
            pending.sighting = sighting;
            pending.reads = pending.reads.saturating_add(1);
            return;
        }
        if self.pending_round.len() >= MAX_PENDING_ROUND {
            warn!(id = %sighting.id, "multiplex round buffer full, dropping sighting");
            return;
        }
        self.pending_round.push(PendingSighting { sighting, reads: 1 });
    }

    fn record_reads(&mut self, sighting: TagSighting, reads: u32, now: DateTime<Utc>) -> Tag {
        for _ in 1..reads {
            self.tags.record(sighting.clone(), now);
        }
        self.tags.record(sighting, now)
    }

    /// Forget everything tied to the current connection.
    pub fn reset_connection(&mut self) {
        self.identity = None;
        self.heartbeat_secs = 0;
        self.input_events_enabled = false;
        self.inputs.iter_mut().for_each(|level| *level = None);
        self.clear_tags();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::TagKind;

    fn sighting(id: &str) -> TagSighting {
        TagSighting::new(id, TagKind::Uhf { rssi: Some(-60) })
    }

    fn report(ids: &[&str]) -> InventoryReport {
        InventoryReport {
            sightings: ids.iter().map(|id| sighting(id)).collect(),
            round_antenna: None,
        }
    }

    #[test]
    fn single_mode_applies_current_antenna() {
        let mut s = SessionState::new(2);
        s.set_antenna_mode(AntennaMode::Single(3));
        let touched = s.apply_inventory(report(&["A", "B"]), Utc::now());
        assert_eq!(touched.len(), 2);
        assert!(touched.iter().all(|t| t.antenna == Some(3)));
        assert_eq!(s.tags.len(), 2);
    }

    #[test]
    fn multiplex_mode_waits_for_round_marker() {
        let mut s = SessionState::new(0);
        s.set_antenna_mode(AntennaMode::Multiplex(vec![1, 2]));
        assert!(s.apply_inventory(report(&["A"]), Utc::now()).is_empty());
        assert!(s.tags.is_empty());

        let marker = InventoryReport {
            sightings: Vec::new(),
            round_antenna: Some(2),
        };
        let touched = s.apply_inventory(marker, Utc::now());
        assert_eq!(touched.len(), 1);
        assert_eq!(touched[0].antenna, Some(2));
        assert_eq!(s.tags.get("A").unwrap().seen_count, 1);
    }

    #[test]
    fn multiplex_mode_applies_explicit_antenna_immediately() {
        let mut s = SessionState::new(0);
        s.set_antenna_mode(AntennaMode::Multiplex(vec![1, 2]));
        let mut with_ant = sighting("A");
        with_ant.antenna = Some(1);
        let touched = s.apply_inventory(
            InventoryReport {
                sightings: vec![with_ant],
                round_antenna: None,
            },
            Utc::now(),
        );
        assert_eq!(touched.len(), 1);
    }

    #[test]
    fn round_marker_ignored_in_single_mode() {
        let mut s = SessionState::new(0);
        let marker = InventoryReport {
            sightings: Vec::new(),
            round_antenna: Some(1),
        };
        assert!(s.apply_inventory(marker, Utc::now()).is_empty());
    }

    #[test]
    fn set_input_grows_when_needed() {
        let mut s = SessionState::new(1);
        s.set_input(3, true);
        assert_eq!(s.inputs, vec![None, None, Some(true)]);
    }

    #[test]
    fn reset_connection_clears_tags_and_identity() {
        let mut s = SessionState::new(1);
        s.apply_inventory(report(&["A"]), Utc::now());
        s.set_input(1, true);
        s.reset_connection();
        assert!(s.tags.is_empty());
        assert_eq!(s.inputs, vec![None]);
        assert!(s.identity.is_none());
    }

    fn round_marker(port: u8) -> InventoryReport {
        InventoryReport {
            sightings: Vec::new(),
            round_antenna: Some(port),
        }
    }

    #[test]
    fn repeated_reads_in_one_round_are_merged() {
        let mut s = SessionState::new(0);
        s.set_antenna_mode(AntennaMode::Multiplex(vec![1, 2]));
        s.apply_inventory(report(&["A", "B", "A"]), Utc::now());
        s.apply_inventory(report(&["A"]), Utc::now());
        assert_eq!(s.pending_round.len(), 2);

        let touched = s.apply_inventory(round_marker(1), Utc::now());
        assert_eq!(touched.len(), 2);
        assert_eq!(s.tags.get("A").unwrap().seen_count, 3);
        assert_eq!(s.tags.get("B").unwrap().seen_count, 1);
        assert!(s.pending_round.is_empty());
    }

    #[test]
    fn round_buffer_is_capped() {
        let mut s = SessionState::new(0);
        s.set_antenna_mode(AntennaMode::Multiplex(vec![1, 2]));
        let ids: Vec<String> = (0..MAX_PENDING_ROUND + 10).map(|i| format!("{i:08X}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        s.apply_inventory(report(&refs), Utc::now());
        assert_eq!(s.pending_round.len(), MAX_PENDING_ROUND);
    }

    #[test]
    fn switching_antenna_mode_drops_open_round() {
        let mut s = SessionState::new(0);
        s.set_antenna_mode(AntennaMode::Multiplex(vec![1, 2]));
        s.apply_inventory(report(&["A"]), Utc::now());

        s.set_antenna_mode(AntennaMode::Single(2));
        assert!(s.pending_round.is_empty());

        s.set_antenna_mode(AntennaMode::Multiplex(vec![1, 2]));
        assert!(s.apply_inventory(round_marker(1), Utc::now()).is_empty());
        assert!(s.tags.is_empty());
    }

    #[test]
    fn same_mode_keeps_open_round() {
        let mut s = SessionState::new(0);
        s.set_antenna_mode(AntennaMode::Multiplex(vec![1, 2]));
        s.apply_inventory(report(&["A"]), Utc::now());
        s.set_antenna_mode(AntennaMode::Multiplex(vec![1, 2]));
        assert_eq!(s.apply_inventory(round_marker(2), Utc::now()).len(), 1);
    }

    #[test]
    fn immediate_apply_records_without_round_marker() {
        let mut s = SessionState::new(0);
        s.set_antenna_mode(AntennaMode::Multiplex(vec![1, 2]));
        let mut with_ant = sighting("B");
        with_ant.antenna = Some(2);
        let touched = s.apply_inventory_now(
            InventoryReport {
                sightings: vec![sighting("A"), with_ant],
                round_antenna: None,
            },
            Utc::now(),
        );
        assert_eq!(touched.len(), 2);
        assert_eq!(s.tags.get("A").unwrap().antenna, None);
        assert_eq!(s.tags.get("B").unwrap().antenna, Some(2));
    }

    #[test]
    fn immediate_apply_uses_single_port() {
        let mut s = SessionState::new(0);
        s.set_antenna_mode(AntennaMode::Single(3));
        let touched = s.apply_inventory_now(report(&["A"]), Utc::now());
        assert_eq!(touched[0].antenna, Some(3));
    }

    #[test]
    fn mark_disconnected_clears_tags_once() {
        let mut s = SessionState::new(0);
        s.state = ConnectionState::Ready;
        s.apply_inventory(report(&["A"]), Utc::now());
        assert!(s.mark_disconnected());
        assert!(s.tags.is_empty());
        assert_eq!(s.state, ConnectionState::Disconnected);
        assert!(!s.mark_disconnected());
    }
}
