use crate::protocol::{StationEntry, StatusReport, StreamMetadata, VolumeChange};

pub const MAX_VOLUME: u8 = 100;

/// Everything the daemon knows about playback.  Only the dispatcher holds a
/// mutable reference, and only while its lock is held.
///
/// Index arithmetic always takes the length of the playlist as read for the
/// current command, so an edited playlist changes wraparound on the next
/// command rather than retroactively.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    current_index: usize,
    pub is_playing: bool,
    volume: u8,
    pub metadata: StreamMetadata,
}

impl PlaybackState {
    pub fn new(volume: u8) -> Self {
        Self {
            current_index: 0,
            is_playing: false,
            volume: volume.min(MAX_VOLUME),
            metadata: StreamMetadata::default(),
        }
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Apply a relative or absolute change and return the clamped result.
    pub fn apply_volume(&mut self, change: VolumeChange) -> u8 {
        let current = i64::from(self.volume);
        let target = match change {
            VolumeChange::Up(n) => current + i64::from(n),
            VolumeChange::Down(n) => current - i64::from(n),
            VolumeChange::Set(n) => i64::from(n),
        };
        self.volume = target.clamp(0, i64::from(MAX_VOLUME)) as u8;
        self.volume
    }

    /// The stored index reduced into `0..len`; `None` for an empty playlist.
    pub fn resolved_index(&self, len: usize) -> Option<usize> {
        (len > 0).then(|| self.current_index % len)
    }

    pub fn next_index(&self, len: usize) -> Option<usize> {
        self.resolved_index(len).map(|i| (i + 1) % len)
    }

    pub fn prev_index(&self, len: usize) -> Option<usize> {
        self.resolved_index(len).map(|i| (i + len - 1) % len)
    }

    /// Resolve a 1-based station number with wraparound.  `station` must be
    /// at least 1; the command parser rejects anything smaller.
    pub fn station_index(station: u32, len: usize) -> Option<usize> {
        if len == 0 || station == 0 {
            return None;
        }
        Some((station as usize - 1) % len)
    }

    /// Select a station.  Callers pass an index already reduced into the
    /// playlist they read.
    pub fn select(&mut self, index: usize) {
        self.current_index = index;
    }

    /// 1-based station number for display, clamped for an empty playlist.
    pub fn display_station(&self, len: usize) -> usize {
        self.resolved_index(len).unwrap_or(0) + 1
    }

    pub fn report(&self, len: usize) -> StatusReport {
        StatusReport {
            playing: self.is_playing,
            current_station: self.display_station(len),
            total_stations: len,
            volume: self.volume,
            metadata: self.metadata.clone(),
        }
    }

    pub fn station_entries(&self, playlist: &[String]) -> Vec<StationEntry> {
        let active = self.resolved_index(playlist.len());
        playlist
            .iter()
            .enumerate()
            .map(|(i, url)| StationEntry {
                id: i + 1,
                url: url.clone(),
                active: Some(i) == active,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_clamps_both_ways() {
        let mut state = PlaybackState::new(50);
        assert_eq!(state.apply_volume(VolumeChange::Up(10)), 60);
        assert_eq!(state.apply_volume(VolumeChange::Up(50)), 100);
        assert_eq!(state.apply_volume(VolumeChange::Up(1000)), 100);
        assert_eq!(state.apply_volume(VolumeChange::Down(1000)), 0);
        assert_eq!(state.apply_volume(VolumeChange::Down(u32::MAX)), 0);
        assert_eq!(state.apply_volume(VolumeChange::Set(250)), 100);
        assert_eq!(state.apply_volume(VolumeChange::Set(30)), 30);
    }

    #[test]
    fn test_initial_volume_is_clamped() {
        assert_eq!(PlaybackState::new(180).volume(), 100);
    }

    #[test]
    fn test_next_and_prev_wrap() {
        let mut state = PlaybackState::new(50);
        state.select(2);
        assert_eq!(state.next_index(3), Some(0));
        state.select(0);
        assert_eq!(state.prev_index(3), Some(2));
        assert_eq!(state.next_index(0), None);
        assert_eq!(state.prev_index(0), None);
    }

    #[test]
    fn test_index_follows_shrunken_playlist() {
        let mut state = PlaybackState::new(50);
        state.select(4);
        // Playlist went from 5 entries down to 3: index 4 reads as 1.
        assert_eq!(state.resolved_index(3), Some(1));
        assert_eq!(state.next_index(3), Some(2));
        assert_eq!(state.prev_index(3), Some(0));
        assert_eq!(state.display_station(3), 2);
    }

    #[test]
    fn test_station_index_wraps() {
        assert_eq!(PlaybackState::station_index(1, 3), Some(0));
        assert_eq!(PlaybackState::station_index(3, 3), Some(2));
        assert_eq!(PlaybackState::station_index(4, 3), Some(0));
        assert_eq!(PlaybackState::station_index(8, 3), Some(1));
        assert_eq!(PlaybackState::station_index(2, 0), None);
        assert_eq!(PlaybackState::station_index(0, 3), None);
    }

    #[test]
    fn test_report_for_empty_playlist() {
        let state = PlaybackState::new(40);
        let report = state.report(0);
        assert_eq!(report.current_station, 1);
        assert_eq!(report.total_stations, 0);
        assert!(!report.playing);
        assert_eq!(report.volume, 40);
    }

    #[test]
    fn test_station_entries_mark_active() {
        let mut state = PlaybackState::new(50);
        state.select(1);
        let playlist = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let entries = state.station_entries(&playlist);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].id, 2);
        assert!(entries[1].active);
        assert!(!entries[0].active && !entries[2].active);
    }
}
