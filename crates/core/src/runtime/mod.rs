//! Host loop tying the periodic callbacks to their components.
//!
//! The runtime owns the scheduler and advances it on demand. Capture
//! delivery, animation ticks, progress polls and display refreshes all run
//! on the caller's thread, one at a time, in deadline order.

use std::time::Duration;

use serde::Serialize;

use crate::{
    capture::CaptureBackend,
    config::VisualizerConfig,
    error::{ErrorKind, Permission},
    lifecycle::{Permissions, VisualizerLifecycle},
    player::{MediaPlayer, PlaybackState, PlayerEvent},
    progress::ProgressTracker,
    render::{DrawCommand, DrawingMode, Viewport},
    timeline::{Fired, Scheduler, TaskId, TaskKind},
    view::VisualizerView,
    Result, VisualizerError,
};

/// Receives one list of draw commands per repaint.
pub trait DisplaySurface {
    fn viewport(&self) -> Viewport;
    fn present(&mut self, commands: Vec<DrawCommand>);
}

/// Surface that keeps the latest frame and counts repaints.
#[derive(Debug, Clone)]
pub struct CollectingSurface {
    viewport: Viewport,
    frames: u64,
    last_frame: Vec<DrawCommand>,
}

impl CollectingSurface {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            frames: 0,
            last_frame: Vec::new(),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_frame(&self) -> &[DrawCommand] {
        &self.last_frame
    }
}

impl DisplaySurface for CollectingSurface {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn present(&mut self, commands: Vec<DrawCommand>) {
        self.frames += 1;
        self.last_frame = commands;
    }
}

/// A failure that degraded the pipeline without stopping it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incident {
    pub at_ms: u64,
    pub kind: ErrorKind,
    pub message: String,
}

pub struct Runtime<P, B, S> {
    scheduler: Scheduler,
    player: P,
    lifecycle: VisualizerLifecycle<B>,
    view: VisualizerView,
    progress: ProgressTracker,
    surface: S,
    refresh_interval: Duration,
    display_task: Option<TaskId>,
    incidents: Vec<Incident>,
}

impl<P, B, S> Runtime<P, B, S>
where
    P: MediaPlayer,
    B: CaptureBackend,
    S: DisplaySurface,
{
    pub fn new(
        config: &VisualizerConfig,
        player: P,
        backend: B,
        surface: S,
        permissions: Permissions,
    ) -> Result<Self> {
        config.validate()?;

        let mut scheduler = Scheduler::new();
        let mut view = VisualizerView::new(config, scheduler.now());
        view.attach(&mut scheduler);
        let refresh_interval = config.render.refresh_interval();
        let display_task = Some(scheduler.schedule_repeating(TaskKind::Display, refresh_interval));

        Ok(Self {
            scheduler,
            player,
            lifecycle: VisualizerLifecycle::new(backend, config, permissions),
            view,
            progress: ProgressTracker::from_config(&config.progress),
            surface,
            refresh_interval,
            display_task,
            incidents: Vec::new(),
        })
    }

    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    pub fn lifecycle(&self) -> &VisualizerLifecycle<B> {
        &self.lifecycle
    }

    pub fn view(&self) -> &VisualizerView {
        &self.view
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn progress_mut(&mut self) -> &mut ProgressTracker {
        &mut self.progress
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn set_drawing_mode(&mut self, mode: DrawingMode) {
        self.view.set_drawing_mode(mode);
    }

    /// Drains the failures reported so far.
    pub fn take_incidents(&mut self) -> Vec<Incident> {
        self.collect_lifecycle_incidents();
        std::mem::take(&mut self.incidents)
    }

    /// Forwards a permission grant; a previously refused setup is retried.
    pub fn grant_permission(&mut self, permission: Permission) {
        let session = self.player.session_id();
        match self
            .lifecycle
            .permission_granted(permission, session, &mut self.scheduler)
        {
            Ok(true) => {
                self.view.cancel_animation();
                tracing::info!(%permission, "visualizer restarted after permission grant");
            }
            Ok(false) => {}
            Err(err) => self.report(err),
        }
        self.collect_lifecycle_incidents();
    }

    /// Runs every callback due up to `until`, then moves the clock there.
    pub fn advance_to(&mut self, until: Duration) {
        self.pump_player(self.scheduler.now());
        while let Some(fired) = self.scheduler.pop_due(until) {
            self.pump_player(fired.at);
            self.dispatch(fired);
        }
        self.scheduler.settle(until);
        self.pump_player(until);
    }

    pub fn advance_by(&mut self, delta: Duration) {
        let until = self.scheduler.now() + delta;
        self.advance_to(until);
    }

    /// Stops every callback and frees the capture tap and recording.
    pub fn shutdown(&mut self) {
        self.lifecycle.release(&mut self.scheduler);
        self.view.release(&mut self.scheduler);
        self.progress.stop(&mut self.scheduler);
        if let Some(task) = self.display_task.take() {
            self.scheduler.cancel(task);
        }
        self.collect_lifecycle_incidents();
        tracing::debug!("runtime shut down");
    }

    fn pump_player(&mut self, now: Duration) {
        for event in self.player.poll_events(now) {
            self.handle_player_event(event);
        }
    }

    fn handle_player_event(&mut self, event: PlayerEvent) {
        let session = self.player.session_id();
        match event {
            PlayerEvent::Prepared(song) => {
                tracing::info!(title = %song.title, session = session.0, "track prepared");
                self.lifecycle.reset(&mut self.scheduler);
                self.view.cancel_animation();
                self.lifecycle.set_title(song.title);
                match self.lifecycle.setup_and_start(session, &mut self.scheduler) {
                    Ok(()) => {
                        if let Err(err) = self.lifecycle.start_recording() {
                            self.report(err);
                        }
                    }
                    Err(err) => self.report(err),
                }
                self.progress.start(&mut self.scheduler);
            }
            PlayerEvent::StateChanged(state) => {
                if let Err(err) = self
                    .lifecycle
                    .on_playback_state(state, session, &mut self.scheduler)
                {
                    self.report(err);
                }
                match state {
                    PlaybackState::Playing => self.progress.start(&mut self.scheduler),
                    PlaybackState::Paused => {
                        self.view.cancel_animation();
                        self.progress.stop(&mut self.scheduler);
                    }
                }
            }
            PlayerEvent::Completed => tracing::info!("playback completed"),
        }
        self.collect_lifecycle_incidents();
    }

    fn dispatch(&mut self, fired: Fired) {
        match fired.kind {
            TaskKind::Capture => {
                self.lifecycle.on_capture_tick(&mut self.view, fired.at);
                self.collect_lifecycle_incidents();
            }
            TaskKind::Animation => self.view.on_animation_tick(fired.at),
            TaskKind::Progress => {
                self.progress.on_tick(&self.player, &mut self.scheduler);
            }
            TaskKind::Display => {
                if self.view.take_redraw() {
                    let commands = self.view.render(self.surface.viewport());
                    self.surface.present(commands);
                }
            }
        }
    }

    fn collect_lifecycle_incidents(&mut self) {
        for err in self.lifecycle.take_incidents() {
            self.push_incident(err);
        }
    }

    fn report(&mut self, err: VisualizerError) {
        tracing::warn!(%err, kind = ?err.kind(), "visualizer degraded");
        self.push_incident(err);
    }

    fn push_incident(&mut self, err: VisualizerError) {
        self.incidents.push(Incident {
            at_ms: self.scheduler.now().as_millis() as u64,
            kind: err.kind(),
            message: err.to_string(),
        });
    }
}

impl<P, B, S> std::fmt::Debug for Runtime<P, B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("now", &self.scheduler.now())
            .field("lifecycle", &self.lifecycle)
            .field("refresh_interval", &self.refresh_interval)
            .field("incidents", &self.incidents.len())
            .finish()
    }
}
