//! Scale and translation of the map layer, and the gestures that change them.
//!
//! A canvas point `p` lands at `scale * (p + translate)` in container pixels.
//! Animations are plain data advanced by [`Viewport::tick`]; the host drives
//! the clock.

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use glam::DVec2;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::path::{BBox, EPSILON};
use crate::surface::Transform;

/// Steps of a full doubling animation; shorter zooms take proportionally fewer.
const ANIMATION_STEPS: f64 = 60.0;

/// Resolves once a zoom or focus transition has settled. Cloneable; every
/// clone resolves together. A transition superseded by another one resolves
/// immediately.
#[derive(Clone)]
pub struct ZoomHandle(Shared<oneshot::Receiver<()>>);

impl ZoomHandle {
    fn pending() -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self(rx.shared()))
    }

    pub fn resolved() -> Self {
        let (tx, handle) = Self::pending();
        let _ = tx.send(());
        handle
    }

    pub fn is_done(&self) -> bool {
        self.0.clone().now_or_never().is_some()
    }
}

impl Future for ZoomHandle {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // A dropped sender means the transition was superseded.
        self.0.poll_unpin(cx).map(|_| ())
    }
}

impl std::fmt::Debug for ZoomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ZoomHandle").field(&self.is_done()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pinch {
    start_distance: f64,
    start_scale: f64,
    center: DVec2,
}

/// Interpolation state. Translation is interpolated in pixels
/// (`translate * scale`) so the anchor moves in a straight line on screen.
#[derive(Debug)]
pub struct Animation {
    step: u32,
    count: u32,
    scale_start: f64,
    scale_end: f64,
    pixels_start: DVec2,
    translate_end: DVec2,
    done: oneshot::Sender<()>,
}

#[derive(Debug)]
pub enum ViewportState {
    Idle,
    Dragging { last: DVec2, moved: bool },
    GestureZoom { pinch: Option<Pinch> },
    AnimatingZoom(Animation),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportOptions {
    pub zoom_min: f64,
    pub zoom_max: f64,
    pub pan_on_drag: bool,
}

impl Default for ViewportOptions {
    fn default() -> Self {
        Self { zoom_min: 1.0, zoom_max: 8.0, pan_on_drag: true }
    }
}

#[derive(Debug)]
pub struct Viewport {
    /// Size of the topology canvas.
    content: DVec2,
    container: DVec2,
    scale: f64,
    translate: DVec2,
    base_scale: f64,
    base_translate: DVec2,
    options: ViewportOptions,
    state: ViewportState,
}

impl Viewport {
    /// A viewport showing the whole content, fitted and centred.
    pub fn new(content: DVec2, container: DVec2, options: ViewportOptions) -> Self {
        let mut viewport = Self {
            content: content.max(DVec2::splat(EPSILON)),
            container,
            scale: 1.0,
            translate: DVec2::ZERO,
            base_scale: 1.0,
            base_translate: DVec2::ZERO,
            options,
            state: ViewportState::Idle,
        };
        viewport.resize(container);
        viewport.reset();
        viewport
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn translate(&self) -> DVec2 {
        self.translate
    }

    pub fn base_scale(&self) -> f64 {
        self.base_scale
    }

    pub fn base_translate(&self) -> DVec2 {
        self.base_translate
    }

    /// Scale relative to the fitted base scale.
    pub fn zoom(&self) -> f64 {
        self.scale / self.base_scale
    }

    pub fn container(&self) -> DVec2 {
        self.container
    }

    pub fn content(&self) -> DVec2 {
        self.content
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn is_animating(&self) -> bool {
        matches!(self.state, ViewportState::AnimatingZoom(_))
    }

    pub fn transform(&self) -> Transform {
        Transform::new(self.scale, self.translate)
    }

    pub fn options(&self) -> ViewportOptions {
        self.options
    }

    pub fn set_options(&mut self, options: ViewportOptions) {
        self.options = options;
    }

    /// Refit to a new container size, keeping the relative zoom.
    pub fn resize(&mut self, container: DVec2) {
        let container = container.max(DVec2::ONE);
        self.container = container;
        let previous = self.base_scale;
        if container.x / container.y > self.content.x / self.content.y {
            self.base_scale = container.y / self.content.y;
            let spare = (container.x - self.content.x * self.base_scale).abs();
            self.base_translate = DVec2::new(spare / (2.0 * self.base_scale), 0.0);
        } else {
            self.base_scale = container.x / self.content.x;
            let spare = (container.y - self.content.y * self.base_scale).abs();
            self.base_translate = DVec2::new(0.0, spare / (2.0 * self.base_scale));
        }
        let ratio = self.base_scale / previous;
        self.scale *= ratio;
        self.translate *= ratio;
        self.clamp();
    }

    /// Back to the fitted, centred view.
    pub fn reset(&mut self) {
        self.supersede();
        self.scale = self.base_scale;
        self.translate = self.base_translate;
        self.clamp();
    }

    /// Keep the content from leaving the container: an axis on which the
    /// content is smaller than the container is centred, otherwise its edges
    /// may not come inside the container's.
    fn clamp(&mut self) {
        self.translate.x = clamp_axis(self.translate.x, self.container.x, self.content.x, self.scale);
        self.translate.y = clamp_axis(self.translate.y, self.container.y, self.content.y, self.scale);
    }

    /// Zoom to `target` (absolute, clamped to the zoom limits).
    ///
    /// With `centered`, `anchor` is the negated canvas point to bring to the
    /// container centre. Otherwise `anchor` is a container pixel that stays
    /// put. Without an anchor the translation is kept.
    pub fn set_scale(&mut self, target: f64, anchor: Option<DVec2>, centered: bool, animate: bool) -> ZoomHandle {
        let target = target
            .min(self.options.zoom_max * self.base_scale)
            .max(self.options.zoom_min * self.base_scale);
        let translate = match anchor {
            Some(anchor) if centered => anchor + self.container / (2.0 * target),
            Some(anchor) => self.translate - (target / self.scale - 1.0) / target * anchor,
            None => self.translate,
        };
        self.supersede();

        let count = ((target - self.scale) * ANIMATION_STEPS / target.max(self.scale)).round().abs() as u32;
        if animate && count > 0 {
            let (done, handle) = ZoomHandle::pending();
            self.state = ViewportState::AnimatingZoom(Animation {
                step: 0,
                count,
                scale_start: self.scale,
                scale_end: target,
                pixels_start: self.translate * self.scale,
                translate_end: translate,
                done,
            });
            handle
        } else {
            self.scale = target;
            self.translate = translate;
            self.clamp();
            ZoomHandle::resolved()
        }
    }

    /// Centre the bounding box, zoomed to fit it.
    pub fn focus_bbox(&mut self, bbox: &BBox, animate: bool) -> ZoomHandle {
        let size = DVec2::new(bbox.width, bbox.height).max(DVec2::splat(EPSILON));
        let scale = (self.container.x / size.x).min(self.container.y / size.y);
        self.set_scale(scale, Some(-bbox.center()), true, animate)
    }

    /// Centre a canvas point at `zoom` times the base scale.
    pub fn focus_point(&mut self, canvas: DVec2, zoom: f64, animate: bool) -> ZoomHandle {
        self.set_scale(zoom * self.base_scale, Some(-canvas), true, animate)
    }

    /// The whole content, centred at the base scale.
    pub fn focus_full_extent(&mut self, animate: bool) -> ZoomHandle {
        self.focus_point(self.content / 2.0, 1.0, animate)
    }

    /// Advance a running animation by one step. Returns whether the
    /// transform changed.
    pub fn tick(&mut self) -> bool {
        let ViewportState::AnimatingZoom(animation) = &mut self.state else {
            return false;
        };
        animation.step += 1;
        let finished = animation.step >= animation.count;
        let (scale, translate) = if finished {
            (animation.scale_end, animation.translate_end)
        } else {
            let t = animation.step as f64 / animation.count as f64;
            let scale = animation.scale_start + (animation.scale_end - animation.scale_start) * t;
            let pixels_end = animation.translate_end * animation.scale_end;
            let pixels = animation.pixels_start + (pixels_end - animation.pixels_start) * t;
            (scale, pixels / scale)
        };
        self.scale = scale;
        self.translate = translate;
        if finished {
            if let ViewportState::AnimatingZoom(animation) = std::mem::replace(&mut self.state, ViewportState::Idle) {
                let _ = animation.done.send(());
            }
        }
        self.clamp();
        true
    }

    /// End a running animation where it stands. Its handle resolves.
    fn supersede(&mut self) {
        if self.is_animating() {
            self.state = ViewportState::Idle;
        }
    }

    pub fn pointer_down(&mut self, at: DVec2) {
        self.supersede();
        self.state = ViewportState::Dragging { last: at, moved: false };
    }

    /// Pan by the pointer delta while dragging. Returns whether the
    /// transform changed.
    pub fn pointer_move(&mut self, at: DVec2) -> bool {
        let ViewportState::Dragging { last, moved } = &mut self.state else {
            return false;
        };
        if *last == at {
            return false;
        }
        let delta = *last - at;
        *last = at;
        *moved = true;
        if !self.options.pan_on_drag {
            return false;
        }
        self.translate -= delta / self.scale;
        self.clamp();
        true
    }

    /// Shift the content by `delta` container pixels.
    pub fn pan(&mut self, delta: DVec2) {
        self.supersede();
        self.translate += delta / self.scale;
        self.clamp();
    }

    /// Leave the drag. Returns whether the pointer moved while pressed, or
    /// `None` when no drag was in progress.
    pub fn pointer_up(&mut self) -> Option<bool> {
        match std::mem::replace(&mut self.state, ViewportState::Idle) {
            ViewportState::Dragging { moved, .. } => Some(moved),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Zoom by one wheel event around the pixel `at`. `speed` is the
    /// sensitivity, 1 to 10.
    pub fn wheel(&mut self, at: DVec2, delta_y: f64, delta_factor: f64, speed: f64) {
        let previous = std::mem::replace(&mut self.state, ViewportState::GestureZoom { pinch: None });
        let factor = (1.0 + speed / 1000.0).powf(delta_factor * delta_y);
        self.set_scale(self.scale * factor, Some(at), false, false);
        self.state = match previous {
            dragging @ ViewportState::Dragging { .. } => dragging,
            _ => ViewportState::Idle,
        };
    }

    pub fn pinch_start(&mut self, a: DVec2, b: DVec2) {
        self.supersede();
        self.state = ViewportState::GestureZoom {
            pinch: Some(Pinch {
                start_distance: a.distance(b).max(EPSILON),
                start_scale: self.scale,
                center: (a + b) / 2.0,
            }),
        };
    }

    /// Scale by the change in finger distance around the starting centre.
    pub fn pinch_move(&mut self, a: DVec2, b: DVec2) -> bool {
        let ViewportState::GestureZoom { pinch: Some(pinch) } = self.state else {
            return false;
        };
        let target = pinch.start_scale * a.distance(b) / pinch.start_distance;
        self.set_scale(target, Some(pinch.center), false, false);
        true
    }

    pub fn pinch_end(&mut self) {
        if matches!(self.state, ViewportState::GestureZoom { .. }) {
            self.state = ViewportState::Idle;
        }
    }
}

fn clamp_axis(translate: f64, container: f64, content: f64, scale: f64) -> f64 {
    let extent = content * scale;
    if extent <= container {
        (container - extent) / (2.0 * scale)
    } else {
        translate.min(0.0).max((container - extent) / scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        Viewport::new(DVec2::new(400.0, 300.0), DVec2::new(800.0, 600.0), ViewportOptions::default())
    }

    #[test]
    fn test_fit_and_center() {
        let vp = Viewport::new(DVec2::new(400.0, 100.0), DVec2::new(800.0, 600.0), ViewportOptions::default());
        assert_eq!(vp.base_scale(), 2.0);
        assert_eq!(vp.translate(), DVec2::new(0.0, 100.0));
        assert_eq!(vp.transform().apply(DVec2::new(200.0, 50.0)), DVec2::new(400.0, 300.0));
    }

    #[test]
    fn test_scale_clamped_to_limits() {
        let mut vp = viewport();
        vp.set_scale(0.1, None, false, false);
        assert_eq!(vp.scale(), vp.base_scale());
        vp.set_scale(1000.0, None, false, false);
        assert_eq!(vp.scale(), 8.0 * vp.base_scale());
    }

    #[test]
    fn test_anchored_zoom_keeps_pixel_fixed() {
        let mut vp = viewport();
        let anchor = DVec2::new(200.0, 150.0);
        let under = vp.transform().invert(anchor);
        vp.set_scale(4.0, Some(anchor), false, false);
        assert!((vp.transform().apply(under) - anchor).length() < 1e-9);
    }

    #[test]
    fn test_centered_focus() {
        let mut vp = viewport();
        let handle = vp.focus_point(DVec2::new(300.0, 100.0), 2.0, false);
        assert!(handle.is_done());
        assert_eq!(vp.scale(), 4.0);
        assert!((vp.transform().apply(DVec2::new(300.0, 100.0)) - DVec2::new(400.0, 300.0)).length() < 1e-9);
    }

    #[test]
    fn test_degenerate_bbox_focus() {
        let mut vp = viewport();
        vp.focus_bbox(&BBox::new(100.0, 100.0, 0.0, 0.0), false);
        assert_eq!(vp.scale(), 8.0 * vp.base_scale());
    }

    #[test]
    fn test_animation_steps_then_resolves() {
        let mut vp = viewport();
        let handle = vp.set_scale(4.0, Some(DVec2::new(400.0, 300.0)), false, true);
        assert!(vp.is_animating());
        for _ in 0..29 {
            assert!(vp.tick());
        }
        assert!(!handle.is_done());
        assert!(vp.scale() < 4.0);
        vp.tick();
        assert!(handle.is_done());
        assert_eq!(vp.scale(), 4.0);
        assert!(!vp.tick());
    }

    #[test]
    fn test_superseded_animation_resolves() {
        let mut vp = viewport();
        let first = vp.set_scale(8.0, None, false, true);
        vp.tick();
        let second = vp.set_scale(6.0, None, false, true);
        assert!(first.is_done());
        assert!(!second.is_done());
    }

    #[test]
    fn test_drag_pans_and_clamps() {
        let mut vp = viewport();
        vp.set_scale(4.0, Some(DVec2::new(200.0, 150.0)), false, false);
        let before = vp.translate();
        vp.pointer_down(DVec2::new(100.0, 100.0));
        assert!(vp.pointer_move(DVec2::new(120.0, 100.0)));
        assert_eq!(vp.translate().x, before.x + 5.0);
        vp.pointer_move(DVec2::new(5000.0, 100.0));
        assert_eq!(vp.translate().x, 0.0);
        assert_eq!(vp.pointer_up(), Some(true));
        assert!(matches!(vp.state(), ViewportState::Idle));
        assert_eq!(vp.pointer_up(), None);
    }

    #[test]
    fn test_pan_by_pixels() {
        let mut vp = viewport();
        vp.pan(DVec2::new(40.0, 0.0));
        assert_eq!(vp.translate(), DVec2::ZERO);
        vp.set_scale(8.0, Some(DVec2::new(400.0, 300.0)), false, false);
        let before = vp.translate();
        vp.pan(DVec2::new(-40.0, 16.0));
        assert_eq!(vp.translate(), before + DVec2::new(-5.0, 2.0));
    }

    #[test]
    fn test_pan_disabled_still_tracks_movement() {
        let options = ViewportOptions { pan_on_drag: false, ..ViewportOptions::default() };
        let mut vp = Viewport::new(DVec2::new(400.0, 300.0), DVec2::new(800.0, 600.0), options);
        vp.pointer_down(DVec2::ZERO);
        assert!(!vp.pointer_move(DVec2::new(10.0, 0.0)));
        assert_eq!(vp.pointer_up(), Some(true));
    }

    #[test]
    fn test_wheel_zooms_by_speed() {
        let mut vp = viewport();
        vp.set_scale(4.0, None, false, false);
        vp.wheel(DVec2::new(400.0, 300.0), 1.0, 1.0, 3.0);
        assert!((vp.scale() - 4.0 * 1.003).abs() < 1e-12);
        assert!(matches!(vp.state(), ViewportState::Idle));
    }

    #[test]
    fn test_pinch() {
        let mut vp = viewport();
        vp.pinch_start(DVec2::new(300.0, 300.0), DVec2::new(500.0, 300.0));
        assert!(vp.pinch_move(DVec2::new(200.0, 300.0), DVec2::new(600.0, 300.0)));
        assert_eq!(vp.scale(), 4.0);
        vp.pinch_end();
        assert!(matches!(vp.state(), ViewportState::Idle));
    }

    #[test]
    fn test_resize_keeps_relative_zoom() {
        let mut vp = viewport();
        vp.set_scale(4.0, None, false, false);
        vp.resize(DVec2::new(400.0, 600.0));
        assert_eq!(vp.base_scale(), 1.0);
        assert_eq!(vp.zoom(), 2.0);
    }
}
