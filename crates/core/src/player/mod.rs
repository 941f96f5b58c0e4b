//! Contract for the external media player that feeds the visualiser.
//!
//! Decoding and playback are owned elsewhere; the pipeline only needs the
//! session id to tap, transport controls, the playback position and a stream
//! of state-change notifications. [`SimulatedPlayer`] is a clock-driven
//! stand-in used by the command line and the tests.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identifier of the audio session a capture tap attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub i32);

impl SessionId {
    /// Reported by a player that has no active audio session.
    pub const INVALID: SessionId = SessionId(-1);

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

/// Catalogue entry. Read-only to the visualiser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: u64,
    pub title: String,
    pub artist: String,
    pub duration_hint_ms: u64,
    pub resource: String,
}

impl Song {
    pub fn new(id: u64, title: impl Into<String>, duration_hint_ms: u64) -> Self {
        Self {
            id,
            title: title.into(),
            artist: String::new(),
            duration_hint_ms,
            resource: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Playing,
    Paused,
}

/// Notifications emitted by the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// A new track finished preparing and owns a fresh audio session.
    Prepared(Song),
    StateChanged(PlaybackState),
    /// Playback reached the end of the track.
    Completed,
}

pub trait MediaPlayer {
    fn session_id(&self) -> SessionId;
    fn is_playing(&self) -> bool;
    fn position_ms(&self) -> u64;
    fn duration_ms(&self) -> u64;
    fn current_song(&self) -> Option<&Song>;
    fn play(&mut self);
    fn pause(&mut self);
    fn seek_to(&mut self, position_ms: u64);

    /// Brings the player up to `now` and drains pending notifications.
    fn poll_events(&mut self, now: Duration) -> Vec<PlayerEvent>;

    fn toggle_play_pause(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }
}

/// Player whose position advances with the timeline it is polled with.
#[derive(Debug, Default)]
pub struct SimulatedPlayer {
    song: Option<Song>,
    session: Option<SessionId>,
    forced_session: Option<SessionId>,
    sessions_opened: i32,
    playing: bool,
    position_ms: u64,
    duration_ms: u64,
    last_poll: Duration,
    events: Vec<PlayerEvent>,
}

impl SimulatedPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `session` for every track instead of allocating fresh ids.
    pub fn with_session(mut self, session: SessionId) -> Self {
        self.forced_session = Some(session);
        self
    }

    /// Prepares `song` and starts playing it from the beginning.
    pub fn load(&mut self, song: Song) {
        self.sessions_opened += 1;
        self.session = Some(self.forced_session.unwrap_or(SessionId(self.sessions_opened)));
        self.position_ms = 0;
        self.duration_ms = song.duration_hint_ms;
        tracing::debug!(title = %song.title, duration_ms = self.duration_ms, "track prepared");
        self.song = Some(song.clone());
        self.events.push(PlayerEvent::Prepared(song));
        self.playing = false;
        self.play();
    }
}

impl MediaPlayer for SimulatedPlayer {
    fn session_id(&self) -> SessionId {
        self.session.unwrap_or(SessionId::INVALID)
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn position_ms(&self) -> u64 {
        self.position_ms
    }

    fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    fn current_song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    fn play(&mut self) {
        if self.playing || self.song.is_none() {
            return;
        }
        if self.position_ms >= self.duration_ms {
            self.position_ms = 0;
        }
        self.playing = true;
        self.events.push(PlayerEvent::StateChanged(PlaybackState::Playing));
    }

    fn pause(&mut self) {
        if !self.playing {
            return;
        }
        self.playing = false;
        self.events.push(PlayerEvent::StateChanged(PlaybackState::Paused));
    }

    fn seek_to(&mut self, position_ms: u64) {
        self.position_ms = position_ms.min(self.duration_ms);
    }

    fn poll_events(&mut self, now: Duration) -> Vec<PlayerEvent> {
        let elapsed = now.saturating_sub(self.last_poll);
        self.last_poll = self.last_poll.max(now);

        if self.playing {
            let advanced = self.position_ms + elapsed.as_millis() as u64;
            if advanced >= self.duration_ms {
                self.position_ms = self.duration_ms;
                self.playing = false;
                self.events.push(PlayerEvent::Completed);
                self.events.push(PlayerEvent::StateChanged(PlaybackState::Paused));
            } else {
                self.position_ms = advanced;
            }
        }

        std::mem::take(&mut self.events)
    }
}
