//! Node sync status from log text
//!
//! The node reports sync progress only in its log, so status requests mine
//! the log tail with a fixed set of patterns. This is a pure function of
//! the text: given the same tail it always produces the same status, and
//! it can be swapped for a structured status RPC without touching the
//! controller.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::process::spawn::read_log_tail;

/// How much of the log file is considered
const TAIL_BYTES: u64 = 256 * 1024;

/// How many matching lines are scanned
const MAX_MATCHING_LINES: usize = 50;

/// Derived sync state of the local node. Recomputed per request, never
/// stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub running: bool,
    pub synced: bool,
    pub height: u64,
    pub target: u64,
    pub progress: u8,
}

impl SyncStatus {
    /// Status of a node that is not running
    pub fn offline() -> Self {
        Self::default()
    }
}

/// Scan a node log for sync status. `synced_height_floor` is the "My Tip"
/// height above which the node is assumed caught up even without an
/// explicit progress line.
pub fn scan_log(log_path: &Path, synced_height_floor: u64) -> SyncStatus {
    parse_sync_status(&read_log_tail(log_path, TAIL_BYTES), synced_height_floor)
}

/// The pure text -> status rules, newest line first:
///
/// 1. `Updating node: P% (C/T)` is authoritative for progress and heights;
///    100% means synced; stop scanning.
/// 2. `My Tip: H` sets the height (newest such line wins); above the floor
///    it also means synced.
/// 3. `Initial Tip: H` fills the height only if nothing newer set it.
/// 4. `fully synchronized` unconditionally means synced; stop scanning.
pub fn parse_sync_status(text: &str, synced_height_floor: u64) -> SyncStatus {
    static UPDATING: OnceLock<Regex> = OnceLock::new();
    static MY_TIP: OnceLock<Regex> = OnceLock::new();
    static INITIAL_TIP: OnceLock<Regex> = OnceLock::new();

    let updating = UPDATING
        .get_or_init(|| Regex::new(r"Updating node:\s*(\d+)%\s*\((\d+)/(\d+)\)").unwrap());
    let my_tip = MY_TIP.get_or_init(|| Regex::new(r"My Tip:\s*(\d+)").unwrap());
    let initial_tip = INITIAL_TIP.get_or_init(|| Regex::new(r"Initial Tip:\s*(\d+)").unwrap());

    let matching: Vec<&str> = text
        .lines()
        .filter(|line| {
            line.contains("My Tip:")
                || line.contains("Updating node:")
                || line.contains("Initial Tip:")
                || line.to_lowercase().contains("fully synchronized")
        })
        .collect();
    let window = &matching[matching.len().saturating_sub(MAX_MATCHING_LINES)..];

    let mut status = SyncStatus {
        running: true,
        ..SyncStatus::default()
    };

    for line in window.iter().rev() {
        if let Some(caps) = updating.captures(line) {
            status.progress = parse_num(&caps[1]).min(100) as u8;
            status.height = parse_num(&caps[2]);
            status.target = parse_num(&caps[3]);
            if status.progress >= 100 {
                status.synced = true;
            }
            break;
        }

        if status.height == 0 {
            if let Some(caps) = my_tip.captures(line) {
                status.height = parse_num(&caps[1]);
                // A tip past the floor is evidence the node is caught up
                if status.height > synced_height_floor {
                    status.synced = true;
                    status.progress = 100;
                }
            }
        }

        if status.height == 0 {
            if let Some(caps) = initial_tip.captures(line) {
                status.height = parse_num(&caps[1]);
            }
        }

        if line.to_lowercase().contains("fully synchronized") {
            status.synced = true;
            status.progress = 100;
            break;
        }
    }

    status
}

fn parse_num(digits: &str) -> u64 {
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOOR: u64 = 3_000_000;

    #[test]
    fn test_initial_tip_only() {
        let status = parse_sync_status("I 2026-02-11 Initial Tip: 100\n", FLOOR);
        assert_eq!(
            status,
            SyncStatus {
                running: true,
                synced: false,
                height: 100,
                target: 0,
                progress: 0,
            }
        );
    }

    #[test]
    fn test_progress_line_authoritative() {
        let status = parse_sync_status(
            "Initial Tip: 5\nUpdating node: 57% (570/1000)\n",
            FLOOR,
        );
        assert_eq!(status.progress, 57);
        assert_eq!(status.height, 570);
        assert_eq!(status.target, 1000);
        assert!(!status.synced);
    }

    #[test]
    fn test_progress_complete_means_synced() {
        let status = parse_sync_status("Updating node: 100% (1000/1000)\n", FLOOR);
        assert!(status.synced);
        assert_eq!(status.progress, 100);
    }

    #[test]
    fn test_my_tip_past_floor_means_synced() {
        let status = parse_sync_status("My Tip: 3500000\n", FLOOR);
        assert!(status.synced);
        assert_eq!(status.progress, 100);
        assert_eq!(status.height, 3_500_000);
    }

    #[test]
    fn test_my_tip_below_floor_not_synced() {
        let status = parse_sync_status("My Tip: 1200\n", FLOOR);
        assert!(!status.synced);
        assert_eq!(status.height, 1200);
        assert_eq!(status.progress, 0);
    }

    #[test]
    fn test_fully_synchronized_phrase() {
        let status = parse_sync_status("My Tip: 50\nnode is Fully Synchronized\n", FLOOR);
        assert!(status.synced);
        assert_eq!(status.progress, 100);
    }

    #[test]
    fn test_newest_line_wins() {
        // The scan runs newest-to-oldest; the newer progress line must win
        let status = parse_sync_status(
            "Updating node: 10% (100/1000)\nUpdating node: 90% (900/1000)\n",
            FLOOR,
        );
        assert_eq!(status.progress, 90);
        assert_eq!(status.height, 900);
    }

    #[test]
    fn test_newest_my_tip_wins() {
        let status = parse_sync_status("My Tip: 100\nMy Tip: 200\n", FLOOR);
        assert_eq!(status.height, 200);
    }

    #[test]
    fn test_deterministic() {
        let text = "Initial Tip: 1\nMy Tip: 42\nUpdating node: 3% (42/1400)\n";
        let first = parse_sync_status(text, FLOOR);
        for _ in 0..10 {
            assert_eq!(parse_sync_status(text, FLOOR), first);
        }
    }

    #[test]
    fn test_no_matches_defaults() {
        let status = parse_sync_status("nothing relevant here\n", FLOOR);
        assert_eq!(
            status,
            SyncStatus {
                running: true,
                ..SyncStatus::default()
            }
        );
    }

    #[test]
    fn test_window_bounds_scan() {
        // Only the newest 50 matching lines are considered
        let mut text = String::from("Updating node: 99% (990/1000)\n");
        for _ in 0..60 {
            text.push_str("My Tip: 10\n");
        }
        let status = parse_sync_status(&text, FLOOR);
        // The old progress line fell out of the window
        assert_eq!(status.progress, 0);
        assert_eq!(status.height, 10);
    }

    #[test]
    fn test_offline_status() {
        assert_eq!(
            SyncStatus::offline(),
            SyncStatus {
                running: false,
                synced: false,
                height: 0,
                target: 0,
                progress: 0,
            }
        );
    }

    #[test]
    fn test_scan_missing_log() {
        let status = scan_log(Path::new("/no/such/beam-node.log"), FLOOR);
        assert!(status.running);
        assert_eq!(status.height, 0);
    }
}
