//! Paints the animated signal as a list of backend-neutral draw commands.
//!
//! Layers, back to front: radial gradient background, the rotating circular
//! waveform, then either the mirrored linear waveform or the spectrum bars
//! depending on the [`DrawingMode`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{config::RenderConfig, smoothing::AnimatedSignal, Result, VisualizerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#RRGGBB`.
    pub fn from_hex(value: &str) -> Result<Self> {
        let digits = value.strip_prefix('#').unwrap_or(value);
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(VisualizerError::Config(format!("`{value}` is not a #RRGGBB colour")));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map_err(|_| VisualizerError::Config(format!("`{value}` is not a #RRGGBB colour")))
        };
        Ok(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Size of the display surface in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shader {
    Radial {
        center: Point,
        radius: f32,
        colors: Vec<Color>,
    },
    Linear {
        from: Point,
        to: Point,
        start: Color,
        end: Color,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PaintStyle {
    Fill,
    Stroke { width: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paint {
    pub shader: Shader,
    pub style: PaintStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PathOp {
    MoveTo(Point),
    LineTo(Point),
    Close,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub ops: Vec<PathOp>,
}

impl Path {
    /// Polyline through `points`, starting with a move.
    pub fn through(points: impl IntoIterator<Item = Point>) -> Self {
        let ops = points
            .into_iter()
            .enumerate()
            .map(|(i, point)| if i == 0 { PathOp::MoveTo(point) } else { PathOp::LineTo(point) })
            .collect();
        Self { ops }
    }

    pub fn close(mut self) -> Self {
        self.ops.push(PathOp::Close);
        self
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.ops.last(), Some(PathOp::Close))
    }

    /// Vertices in drawing order.
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        self.ops.iter().filter_map(|op| match op {
            PathOp::MoveTo(point) | PathOp::LineTo(point) => Some(*point),
            PathOp::Close => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DrawCommand {
    Rect { rect: Rect, paint: Paint },
    RoundRect { rect: Rect, radius: f32, paint: Paint },
    Path { path: Path, paint: Paint },
    /// Pushes the current transform.
    Save,
    Rotate { degrees: f32, pivot: Point },
    Restore,
}

/// Which layers are painted on top of the background.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawingMode {
    /// Circular waveform plus the mirrored linear waveform.
    Waveform,
    /// Spectrum bars only.
    Spectrum,
    /// Circular waveform plus spectrum bars.
    #[default]
    Both,
}

impl FromStr for DrawingMode {
    type Err = VisualizerError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "waveform" => Ok(Self::Waveform),
            "spectrum" | "fft" => Ok(Self::Spectrum),
            "both" => Ok(Self::Both),
            other => Err(VisualizerError::Config(format!("unknown drawing mode `{other}`"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Renderer {
    config: RenderConfig,
    mode: DrawingMode,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            mode: DrawingMode::default(),
        }
    }

    pub fn mode(&self) -> DrawingMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: DrawingMode) {
        self.mode = mode;
    }

    /// Builds one frame. Reads `signal` only.
    pub fn render(&self, signal: &AnimatedSignal, viewport: Viewport) -> Vec<DrawCommand> {
        let mut commands = Vec::new();
        if viewport.is_empty() {
            return commands;
        }

        self.draw_background(&mut commands, viewport);
        let center = viewport.center();
        let short_side = viewport.width.min(viewport.height);
        match self.mode {
            DrawingMode::Waveform => {
                self.draw_circle_wave(&mut commands, signal, center, short_side / 2.0);
                self.draw_waveform(&mut commands, &signal.waveform, viewport);
            }
            DrawingMode::Spectrum => self.draw_spectrum(&mut commands, &signal.spectrum, viewport),
            DrawingMode::Both => {
                self.draw_circle_wave(&mut commands, signal, center, short_side / 3.0);
                self.draw_spectrum(&mut commands, &signal.spectrum, viewport);
            }
        }
        commands
    }

    fn draw_background(&self, commands: &mut Vec<DrawCommand>, viewport: Viewport) {
        commands.push(DrawCommand::Rect {
            rect: Rect {
                left: 0.0,
                top: 0.0,
                right: viewport.width,
                bottom: viewport.height,
            },
            paint: Paint {
                shader: Shader::Radial {
                    center: viewport.center(),
                    radius: viewport.width * self.config.background_radius_factor,
                    colors: self.config.background_colors.clone(),
                },
                style: PaintStyle::Fill,
            },
        });
    }

    fn draw_circle_wave(
        &self,
        commands: &mut Vec<DrawCommand>,
        signal: &AnimatedSignal,
        center: Point,
        radius: f32,
    ) {
        let points = self.config.circle_points.min(signal.waveform.len());
        if points == 0 {
            return;
        }

        let angle_step = 360.0 / points as f32;
        let vertices = signal.waveform[..points].iter().enumerate().map(|(i, value)| {
            let magnitude =
                self.config.circle_floor + (value / self.config.amplitude_divisor) * self.config.circle_gain;
            let angle = (i as f32 * angle_step).to_radians();
            Point::new(
                center.x + angle.cos() * radius * magnitude,
                center.y + angle.sin() * radius * magnitude,
            )
        });

        let (start, end) = self.config.waveform_colors;
        commands.push(DrawCommand::Save);
        commands.push(DrawCommand::Rotate {
            degrees: signal.rotation_angle,
            pivot: center,
        });
        commands.push(DrawCommand::Path {
            path: Path::through(vertices).close(),
            paint: Paint {
                shader: Shader::Linear {
                    from: Point::new(center.x - radius, center.y),
                    to: Point::new(center.x + radius, center.y),
                    start,
                    end,
                },
                style: PaintStyle::Stroke {
                    width: self.config.stroke_width,
                },
            },
        });
        commands.push(DrawCommand::Restore);
    }

    /// Mirrored linear wave. The x-step divides the width by the animated
    /// point count, so the wave always spans the full width.
    fn draw_waveform(&self, commands: &mut Vec<DrawCommand>, waveform: &[f32], viewport: Viewport) {
        if waveform.is_empty() {
            return;
        }

        let (start, end) = self.config.waveform_colors;
        let paint = Paint {
            shader: Shader::Linear {
                from: Point::new(0.0, 0.0),
                to: Point::new(viewport.width, 0.0),
                start,
                end,
            },
            style: PaintStyle::Stroke {
                width: self.config.stroke_width,
            },
        };

        let step = viewport.width / waveform.len() as f32;
        let center_y = viewport.height / 2.0;
        let reach = viewport.height / 3.0;
        for direction in [1.0_f32, -1.0] {
            let path = Path::through(waveform.iter().enumerate().map(|(i, value)| {
                let amplitude = value / self.config.amplitude_divisor;
                Point::new(i as f32 * step, center_y + direction * amplitude * reach)
            }));
            commands.push(DrawCommand::Path {
                path,
                paint: paint.clone(),
            });
        }
    }

    fn draw_spectrum(&self, commands: &mut Vec<DrawCommand>, spectrum: &[f32], viewport: Viewport) {
        let count = spectrum.len().min(self.config.bar_max_points);
        if count == 0 {
            return;
        }

        // Whole-pixel stride so bars sit on pixel boundaries.
        let step = (viewport.width as usize / count) as f32;
        let bar_width = self.config.bar_width.min(step - self.config.bar_space).max(0.0);
        let (start, end) = self.config.spectrum_colors;
        let paint = Paint {
            shader: Shader::Linear {
                from: Point::new(0.0, viewport.height),
                to: Point::new(0.0, 0.0),
                start,
                end,
            },
            style: PaintStyle::Fill,
        };

        for (i, magnitude) in spectrum[..count].iter().enumerate() {
            let bar_height = magnitude.max(0.0).powf(self.config.spectrum_exponent) * viewport.height;
            let left = i as f32 * step + self.config.bar_space;
            commands.push(DrawCommand::RoundRect {
                rect: Rect {
                    left,
                    top: viewport.height - bar_height,
                    right: left + bar_width,
                    bottom: viewport.height,
                },
                radius: self.config.bar_corner_radius,
                paint: paint.clone(),
            });
        }
    }
}
