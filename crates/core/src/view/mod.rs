use std::time::Duration;

use crate::{
    config::VisualizerConfig,
    render::{DrawCommand, DrawingMode, Renderer, Viewport},
    smoothing::{AnimatedSignal, Rotation, Smoother},
    timeline::{Scheduler, TaskId, TaskKind},
};

/// Display-side owner of the animated signal, the smoothing state and the
/// renderer. Capture callbacks push raw data in, the animation task moves
/// the signal forward and the display task paints it.
#[derive(Debug)]
pub struct VisualizerView {
    smoother: Smoother,
    rotation: Rotation,
    renderer: Renderer,
    tick_interval: Duration,
    animation_task: Option<TaskId>,
    needs_redraw: bool,
}

impl VisualizerView {
    /// Builds the view with a zeroed signal. The rotation starts at `now`.
    pub fn new(config: &VisualizerConfig, now: Duration) -> Self {
        Self {
            smoother: Smoother::from_config(&config.animation),
            rotation: Rotation::new(config.animation.rotation_period(), now),
            renderer: Renderer::new(config.render.clone()),
            tick_interval: config.animation.tick_interval(),
            animation_task: None,
            needs_redraw: true,
        }
    }

    /// Starts the animation pump. Calling it twice keeps a single task.
    pub fn attach(&mut self, scheduler: &mut Scheduler) {
        if self.animation_task.is_none() {
            self.animation_task =
                Some(scheduler.schedule_repeating(TaskKind::Animation, self.tick_interval));
        }
    }

    /// Stops every animation. The last signal stays readable.
    pub fn release(&mut self, scheduler: &mut Scheduler) {
        if let Some(task) = self.animation_task.take() {
            scheduler.cancel(task);
        }
        self.smoother.cancel();
    }

    /// Freezes the signal where it is. The rotation keeps turning.
    pub fn cancel_animation(&mut self) {
        self.smoother.cancel();
    }

    pub fn is_attached(&self) -> bool {
        self.animation_task.is_some()
    }

    pub fn update_waveform(&mut self, waveform: &[i8], now: Duration) {
        self.smoother.retarget_waveform(waveform, now);
    }

    pub fn update_fft(&mut self, fft: &[i8], now: Duration) {
        self.smoother.retarget_spectrum(fft, now);
    }

    pub fn on_animation_tick(&mut self, now: Duration) {
        let was_animating = self.smoother.is_animating();
        self.smoother.advance(now);
        self.smoother.signal_mut().rotation_angle = self.rotation.angle_at(now);
        // The rotation alone only repaints when there is something to rotate.
        if was_animating || self.smoother.has_data() {
            self.needs_redraw = true;
        }
    }

    pub fn drawing_mode(&self) -> DrawingMode {
        self.renderer.mode()
    }

    pub fn set_drawing_mode(&mut self, mode: DrawingMode) {
        self.renderer.set_mode(mode);
        self.needs_redraw = true;
    }

    pub fn signal(&self) -> &AnimatedSignal {
        self.smoother.signal()
    }

    pub fn smoother(&self) -> &Smoother {
        &self.smoother
    }

    /// Returns whether a repaint was requested and clears the request.
    pub fn take_redraw(&mut self) -> bool {
        std::mem::take(&mut self.needs_redraw)
    }

    pub fn render(&self, viewport: Viewport) -> Vec<DrawCommand> {
        self.renderer.render(self.smoother.signal(), viewport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn animation_task_is_single_and_cancellable() {
        let config = VisualizerConfig::default();
        let mut scheduler = Scheduler::new();
        let mut view = VisualizerView::new(&config, Duration::ZERO);

        view.attach(&mut scheduler);
        view.attach(&mut scheduler);
        assert_eq!(scheduler.count(TaskKind::Animation), 1);

        view.release(&mut scheduler);
        view.release(&mut scheduler);
        assert_eq!(scheduler.count(TaskKind::Animation), 0);
        assert!(!view.is_attached());
    }

    #[test]
    fn ticks_move_signal_and_rotation() {
        let config = VisualizerConfig::default();
        let mut view = VisualizerView::new(&config, Duration::ZERO);
        view.update_waveform(&[100; 512], ms(0));
        view.update_fft(&[-51; 512], ms(0));
        assert!(view.take_redraw());

        view.on_animation_tick(ms(150));
        assert!(view.take_redraw());
        assert!(!view.take_redraw());
        let signal = view.signal();
        assert!(signal.waveform.iter().all(|&v| v == 100.0));
        assert!(signal.spectrum.iter().all(|&v| (v - 0.2).abs() < 1e-6));
        assert!(signal.rotation_angle > 0.0);
    }

    #[test]
    fn rotation_without_data_does_not_repaint() {
        let config = VisualizerConfig::default();
        let mut view = VisualizerView::new(&config, Duration::ZERO);
        view.update_waveform(&[], ms(0));
        view.update_fft(&[], ms(0));
        view.on_animation_tick(ms(200));
        view.take_redraw();

        view.on_animation_tick(ms(400));
        assert!(!view.take_redraw());
    }

    #[test]
    fn cancelled_animation_leaves_the_signal_in_place() {
        let config = VisualizerConfig::default();
        let mut view = VisualizerView::new(&config, Duration::ZERO);
        view.update_waveform(&[100; 512], ms(0));
        view.update_fft(&[-51; 512], ms(0));
        view.on_animation_tick(ms(48));
        let frozen = view.signal().clone();

        view.cancel_animation();
        assert!(!view.smoother().is_animating());
        view.on_animation_tick(ms(150));
        assert_eq!(view.signal().waveform, frozen.waveform);
        assert_eq!(view.signal().spectrum, frozen.spectrum);
        assert!(view.signal().rotation_angle > frozen.rotation_angle);
    }

    #[test]
    fn mode_changes_request_a_repaint() {
        let config = VisualizerConfig::default();
        let mut view = VisualizerView::new(&config, Duration::ZERO);
        view.take_redraw();
        view.set_drawing_mode(DrawingMode::Spectrum);
        assert!(view.take_redraw());
        assert_eq!(view.drawing_mode(), DrawingMode::Spectrum);
    }
}
