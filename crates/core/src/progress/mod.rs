use std::{
    sync::mpsc::{self, Receiver, Sender},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    config::ProgressConfig,
    player::MediaPlayer,
    timeline::{Scheduler, TaskId, TaskKind},
};

/// Playback position sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub position_ms: u64,
    pub duration_ms: u64,
}

impl Progress {
    /// `mm:ss / mm:ss`.
    pub fn format_mm_ss(&self) -> String {
        format!("{} / {}", format_time(self.position_ms), format_time(self.duration_ms))
    }
}

pub fn format_time(ms: u64) -> String {
    let total_seconds = ms / 1000;
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// Polls the player position while it is playing and publishes samples to
/// every subscriber.
#[derive(Debug)]
pub struct ProgressTracker {
    interval: Duration,
    task: Option<TaskId>,
    latest: Option<Progress>,
    subscribers: Vec<Sender<Progress>>,
    last_logged_second: Option<u64>,
}

impl ProgressTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            task: None,
            latest: None,
            subscribers: Vec::new(),
            last_logged_second: None,
        }
    }

    pub fn from_config(config: &ProgressConfig) -> Self {
        Self::new(config.interval())
    }

    pub fn subscribe(&mut self) -> Receiver<Progress> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn latest(&self) -> Option<Progress> {
        self.latest
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Samples immediately, then every interval. No-op while running.
    pub fn start(&mut self, scheduler: &mut Scheduler) {
        if self.task.is_none() {
            tracing::debug!(interval = ?self.interval, "progress tracking started");
            self.task = Some(scheduler.schedule(TaskKind::Progress, Duration::ZERO, self.interval));
        }
    }

    pub fn stop(&mut self, scheduler: &mut Scheduler) {
        if let Some(task) = self.task.take() {
            scheduler.cancel(task);
            tracing::debug!("progress tracking stopped");
        }
    }

    /// Timer callback. Publishes a sample while the player is playing and
    /// stops itself otherwise.
    pub fn on_tick(&mut self, player: &dyn MediaPlayer, scheduler: &mut Scheduler) -> Option<Progress> {
        if !player.is_playing() {
            self.stop(scheduler);
            return None;
        }

        let progress = Progress {
            position_ms: player.position_ms(),
            duration_ms: player.duration_ms(),
        };
        self.latest = Some(progress);
        self.subscribers.retain(|tx| tx.send(progress).is_ok());

        let second = progress.position_ms / 1000;
        if self.last_logged_second != Some(second) {
            self.last_logged_second = Some(second);
            let title = player.current_song().map(|song| song.title.as_str()).unwrap_or("unknown");
            tracing::debug!(title, progress = %progress.format_mm_ss(), "playback progress");
        }
        Some(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{SimulatedPlayer, Song};

    fn playing_player() -> SimulatedPlayer {
        let mut player = SimulatedPlayer::new();
        player.load(Song::new(1, "Track", 5_000));
        player.poll_events(Duration::ZERO);
        player
    }

    #[test]
    fn formats_minutes_and_seconds() {
        let progress = Progress {
            position_ms: 65_400,
            duration_ms: 3_599_999,
        };
        assert_eq!(progress.format_mm_ss(), "01:05 / 59:59");
        assert_eq!(format_time(0), "00:00");
    }

    #[test]
    fn publishes_while_playing() {
        let mut player = playing_player();
        let mut scheduler = Scheduler::new();
        let mut tracker = ProgressTracker::new(Duration::from_millis(100));
        let rx = tracker.subscribe();

        tracker.start(&mut scheduler);
        tracker.start(&mut scheduler);
        assert_eq!(scheduler.count(TaskKind::Progress), 1);

        player.poll_events(Duration::from_millis(300));
        let sample = tracker.on_tick(&player, &mut scheduler).unwrap();
        assert_eq!(sample.position_ms, 300);
        assert_eq!(rx.try_recv().unwrap(), sample);
        assert_eq!(tracker.latest(), Some(sample));
    }

    #[test]
    fn stops_itself_when_playback_pauses() {
        let mut player = playing_player();
        let mut scheduler = Scheduler::new();
        let mut tracker = ProgressTracker::new(Duration::from_millis(100));
        tracker.start(&mut scheduler);

        player.pause();
        assert!(tracker.on_tick(&player, &mut scheduler).is_none());
        assert!(!tracker.is_running());
        assert_eq!(scheduler.count(TaskKind::Progress), 0);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let player = playing_player();
        let mut scheduler = Scheduler::new();
        let mut tracker = ProgressTracker::new(Duration::from_millis(100));
        drop(tracker.subscribe());
        let rx = tracker.subscribe();

        tracker.on_tick(&player, &mut scheduler);
        assert_eq!(tracker.subscribers.len(), 1);
        assert!(rx.try_recv().is_ok());
    }
}
