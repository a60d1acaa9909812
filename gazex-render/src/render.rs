use anyhow::{Context, Result};
use bytemuck::cast_slice;
use gazex_core::{RenderSurface, ScreenGeometry, Stimulus, StimulusShape, TargetVisual};
use gazex_timing::{HighPrecisionTimer, Timer};
use std::f32::consts::PI;
use std::time::Duration;
use tiny_skia::{Color, FillRule, Paint, Path, PathBuilder, Pixmap, Rect, Transform};
use tracing::warn;

const BACKGROUND: [u8; 4] = [128, 128, 128, 255];
const FIXATOR_SIZE: f32 = 160.0;

/// Timing of the last drawn frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub clear: Duration,
    pub draw: Duration,
    pub total: Duration,
    pub dirty_count: usize,
}

/// Shape fill colors, indexed by `Stimulus::cache_id`.
const SHAPE_COLORS: [[u8; 3]; StimulusShape::COUNT] = [
    [230, 70, 60],   // circle
    [60, 140, 230],  // cross
    [240, 200, 40],  // star
    [70, 190, 110],  // tee
    [255, 255, 255], // wheel
];

/// Software renderer for target frames. Draws into an offscreen canvas and
/// copies only the regions touched since the last copy into the frame buffer.
pub struct SkiaRenderer {
    width: u32,
    height: u32,
    screen: ScreenGeometry,

    /// Unit-sized shape outlines centered at the origin, indexed by `cache_id`.
    shapes: Vec<Path>,

    canvas: Pixmap,
    clear_buffer: Vec<u32>,
    /// Regions drawn this frame; cleared before the next one.
    dirty_regions: Vec<Rect>,
    /// Regions to copy on the next `copy_to_frame`.
    present_regions: Vec<Rect>,
    full_copy: bool,

    timer: HighPrecisionTimer,
    last_stats: FrameStats,
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let shapes = [
            StimulusShape::Circle,
            StimulusShape::Cross,
            StimulusShape::Star,
            StimulusShape::Tee,
            StimulusShape::Wheel,
        ]
        .iter()
        .map(|s| unit_shape(*s).with_context(|| format!("failed to build {s:?} outline")))
        .collect::<Result<Vec<_>>>()?;

        let mut renderer = SkiaRenderer {
            width,
            height,
            screen: ScreenGeometry::new(width as f32, height as f32),
            shapes,
            canvas: Pixmap::new(width, height).context("canvas size must be non-zero")?,
            clear_buffer: Vec::new(),
            dirty_regions: Vec::with_capacity(16),
            present_regions: Vec::with_capacity(32),
            full_copy: true,
            timer: HighPrecisionTimer::new(),
            last_stats: FrameStats::default(),
        };
        renderer.reset_canvas();
        Ok(renderer)
    }

    pub fn resize(&mut self, new_width: u32, new_height: u32) -> Result<()> {
        self.width = new_width;
        self.height = new_height;
        self.screen = ScreenGeometry::new(new_width as f32, new_height as f32);
        self.canvas = Pixmap::new(new_width, new_height).context("canvas size must be non-zero")?;
        self.reset_canvas();
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn screen(&self) -> ScreenGeometry {
        self.screen
    }

    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }

    pub fn frame_timing(&self) -> gazex_timing::CalibrationStats {
        self.timer.calibration_stats()
    }

    pub fn canvas(&self) -> &Pixmap {
        &self.canvas
    }

    fn reset_canvas(&mut self) {
        let pixel = u32::from_ne_bytes(BACKGROUND);
        self.clear_buffer = vec![pixel; (self.width * self.height) as usize];
        self.canvas.data_mut().copy_from_slice(cast_slice(&self.clear_buffer));
        self.dirty_regions.clear();
        self.present_regions.clear();
        self.full_copy = true;
    }

    /// Clears, then draws `targets` and optionally the fixator wheel.
    pub fn render(&mut self, targets: &[TargetVisual], fixator_angle: Option<f32>) -> FrameStats {
        let start = self.timer.now();

        let old = std::mem::take(&mut self.dirty_regions);
        self.clear_regions(&old);
        let clear = self.timer.elapsed(start);

        let t_draw = self.timer.now();
        for visual in targets {
            self.draw_shape(visual.shape, visual.position, visual.size, visual.orientation, visual.opacity);
        }
        if let Some(angle) = fixator_angle {
            self.draw_shape(StimulusShape::Wheel, (0.0, 0.0), FIXATOR_SIZE, angle, 1.0);
        }
        let draw = self.timer.elapsed(t_draw);

        self.present_regions.extend(old);
        self.present_regions.extend_from_slice(&self.dirty_regions);

        let total = self.timer.elapsed(start);
        self.timer.record_frame(total);
        self.last_stats = FrameStats {
            clear,
            draw,
            total,
            dirty_count: self.dirty_regions.len(),
        };
        self.last_stats
    }

    /// Copies everything drawn or cleared since the last call into `frame`, an
    /// RGBA8 buffer of the canvas size.
    pub fn copy_to_frame(&mut self, frame: &mut [u8]) {
        let data = self.canvas.data();
        if frame.len() != data.len() {
            warn!(
                frame = frame.len(),
                canvas = data.len(),
                "frame buffer size does not match canvas"
            );
            return;
        }
        if self.full_copy {
            frame.copy_from_slice(data);
            self.full_copy = false;
            self.present_regions.clear();
            return;
        }

        coalesce(&mut self.present_regions);
        let row_bytes = self.width as usize * 4;
        for rect in self.present_regions.drain(..) {
            let Some((x0, y0, x1, y1)) = clip(rect, self.width, self.height) else {
                continue;
            };
            for row in y0..y1 {
                let start = row * row_bytes + x0 * 4;
                let end = row * row_bytes + x1 * 4;
                frame[start..end].copy_from_slice(&data[start..end]);
            }
        }
    }

    fn clear_regions(&mut self, regions: &[Rect]) {
        let stride = self.width as usize * 4;
        let clear: &[u8] = cast_slice(&self.clear_buffer);
        let canvas = self.canvas.data_mut();
        for rect in regions {
            let Some((x0, y0, x1, y1)) = clip(*rect, self.width, self.height) else {
                continue;
            };
            for y in y0..y1 {
                let start = y * stride + x0 * 4;
                let end = y * stride + x1 * 4;
                canvas[start..end].copy_from_slice(&clear[start..end]);
            }
        }
    }

    fn draw_shape(
        &mut self,
        shape: StimulusShape,
        position: (f32, f32),
        size: f32,
        orientation_deg: f32,
        opacity: f32,
    ) {
        let Some(path) = self.shapes.get(shape.cache_id()) else {
            return;
        };
        let (px, py) = self.screen.to_top_left(position);
        // Canvas y points down, so a positive angle already turns clockwise.
        let transform = Transform::from_translate(px, py)
            .pre_rotate(orientation_deg)
            .pre_scale(size, size);

        let [r, g, b] = SHAPE_COLORS[shape.cache_id()];
        let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        let mut paint = Paint::default();
        paint.anti_alias = true;
        paint.set_color(Color::from_rgba8(r, g, b, alpha));
        self.canvas
            .fill_path(path, &paint, FillRule::Winding, transform, None);

        // A rotated unit square stays within a radius of ~0.71.
        let half = size * 0.75 + 1.0;
        match Rect::from_xywh(px - half, py - half, half * 2.0, half * 2.0) {
            Some(rect) => self.dirty_regions.push(rect),
            None => warn!(?shape, size, "degenerate dirty rect"),
        }
    }
}

impl RenderSurface for SkiaRenderer {
    fn draw_frame(&mut self, targets: &[TargetVisual]) {
        self.render(targets, None);
    }

    fn draw_fixator(&mut self, targets: &[TargetVisual], angle_deg: f32) {
        self.render(targets, Some(angle_deg));
    }
}

fn clip(rect: Rect, width: u32, height: u32) -> Option<(usize, usize, usize, usize)> {
    let x0 = rect.x().floor().clamp(0.0, width as f32) as usize;
    let y0 = rect.y().floor().clamp(0.0, height as f32) as usize;
    let x1 = (rect.x() + rect.width()).ceil().clamp(0.0, width as f32) as usize;
    let y1 = (rect.y() + rect.height()).ceil().clamp(0.0, height as f32) as usize;
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
}

/// Merges overlapping or touching rects that share a row band.
fn coalesce(rects: &mut Vec<Rect>) {
    rects.sort_by(|a, b| a.y().total_cmp(&b.y()).then(a.x().total_cmp(&b.x())));
    let mut out: Vec<Rect> = Vec::with_capacity(rects.len());
    for r in rects.drain(..) {
        if let Some(last) = out.last_mut() {
            let same_row = (r.y() - last.y()).abs() < 1.0 && (r.height() - last.height()).abs() < 1.0;
            let touching = r.x() <= last.x() + last.width() + 1.0;
            if same_row && touching {
                let nx = last.x().min(r.x());
                let nx2 = (last.x() + last.width()).max(r.x() + r.width());
                if let Some(merged) = Rect::from_xywh(nx, last.y(), nx2 - nx, last.height()) {
                    *last = merged;
                    continue;
                }
            }
        }
        out.push(r);
    }
    *rects = out;
}

/// Outline of `shape` fitting a unit square centered at the origin.
fn unit_shape(shape: StimulusShape) -> Option<Path> {
    let mut pb = PathBuilder::new();
    match shape {
        StimulusShape::Circle => pb.push_circle(0.0, 0.0, 0.5),
        StimulusShape::Cross => {
            pb.push_rect(Rect::from_xywh(-0.5, -0.15, 1.0, 0.3)?);
            pb.push_rect(Rect::from_xywh(-0.15, -0.5, 0.3, 1.0)?);
        }
        StimulusShape::Star => {
            for i in 0..10 {
                let radius = if i % 2 == 0 { 0.5 } else { 0.2 };
                let angle = -PI / 2.0 + i as f32 * PI / 5.0;
                let (x, y) = (radius * angle.cos(), radius * angle.sin());
                if i == 0 {
                    pb.move_to(x, y);
                } else {
                    pb.line_to(x, y);
                }
            }
            pb.close();
        }
        StimulusShape::Tee => {
            pb.push_rect(Rect::from_xywh(-0.5, -0.5, 1.0, 0.3)?);
            pb.push_rect(Rect::from_xywh(-0.15, -0.2, 0.3, 0.7)?);
        }
        StimulusShape::Wheel => {
            // Four blades around a hub.
            for i in 0..4 {
                let a = i as f32 * PI / 2.0;
                let b = a + PI / 4.0;
                pb.move_to(0.0, 0.0);
                pb.line_to(0.5 * a.cos(), 0.5 * a.sin());
                pb.line_to(0.5 * b.cos(), 0.5 * b.sin());
                pb.close();
            }
            pb.push_circle(0.0, 0.0, 0.1);
        }
    }
    pb.finish()
}
