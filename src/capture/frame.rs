//! Video frames and the camera stream abstraction the estimators read from.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;

/// Decoded RGBA frame. Pixel data is shared, so clones are cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    rgba: Arc<[u8]>,
}

impl Frame {
    /// Returns `None` when the buffer does not match `width * height * 4`.
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        if rgba.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            rgba: rgba.into(),
        })
    }

    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        Self {
            width,
            height,
            rgba: data.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn rgb(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([self.rgba[i], self.rgba[i + 1], self.rgba[i + 2]])
    }

    /// Iterates the pixels of a rectangle that must lie fully inside the frame.
    pub fn patch(&self, rect: PixelRect) -> Option<impl Iterator<Item = [u8; 3]> + '_> {
        if rect.width == 0 || rect.height == 0 {
            return None;
        }
        if rect.x + rect.width > self.width || rect.y + rect.height > self.height {
            return None;
        }
        let stride = self.width as usize;
        Some((rect.y..rect.y + rect.height).flat_map(move |y| {
            (rect.x..rect.x + rect.width).map(move |x| {
                let i = (y as usize * stride + x as usize) * 4;
                [self.rgba[i], self.rgba[i + 1], self.rgba[i + 2]]
            })
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Square of `size` centred on (`cx`, `cy`), clipped to the frame bounds.
    pub fn centered_clipped(cx: f64, cy: f64, size: u32, frame_w: u32, frame_h: u32) -> Self {
        let half = size as f64 / 2.0;
        let x0 = (cx - half).floor().max(0.0) as u32;
        let y0 = (cy - half).floor().max(0.0) as u32;
        let x1 = ((cx + half).floor().max(0.0) as u32).min(frame_w);
        let y1 = ((cy + half).floor().max(0.0) as u32).min(frame_h);
        Self {
            x: x0.min(frame_w),
            y: y0.min(frame_h),
            width: x1.saturating_sub(x0),
            height: y1.saturating_sub(y0),
        }
    }
}

/// A live camera stream. Reads are snapshots and never exclusive.
pub trait FrameSource: Send + Sync {
    fn dimensions(&self) -> (u32, u32);

    fn is_live(&self) -> bool;

    /// Latest decoded frame, `None` once the stream is stopped or not ready.
    fn grab(&self) -> Option<Frame>;

    /// Track-level stop. Does not cancel estimators already reading.
    fn stop(&self);
}

pub type SharedStream = Arc<dyn FrameSource>;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("camera unavailable: {0}")]
    Unavailable(String),
}

pub trait Camera: Send + Sync {
    fn acquire(&self) -> BoxFuture<'_, Result<SharedStream, CaptureError>>;
}

/// Stream backed by a frame generator indexed by read count; used for replay
/// of recorded clips and synthetic signals.
pub struct GeneratedStream<F> {
    width: u32,
    height: u32,
    generator: F,
    reads: AtomicU64,
    live: AtomicBool,
}

impl<F> GeneratedStream<F>
where
    F: Fn(u64) -> Frame + Send + Sync,
{
    pub fn new(width: u32, height: u32, generator: F) -> Self {
        Self {
            width,
            height,
            generator,
            reads: AtomicU64::new(0),
            live: AtomicBool::new(true),
        }
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

impl<F> FrameSource for GeneratedStream<F>
where
    F: Fn(u64) -> Frame + Send + Sync,
{
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn grab(&self) -> Option<Frame> {
        if !self.is_live() || self.width == 0 || self.height == 0 {
            return None;
        }
        let n = self.reads.fetch_add(1, Ordering::Relaxed);
        Some((self.generator)(n))
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}
