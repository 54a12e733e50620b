//! Software output with a simulated swapchain
//!
//! `HeadlessOutput` behaves like a real output as far as the frame core can
//! tell: it reports buffer ages from a round-robin swapchain, emits lifecycle
//! signals when its mode, transform, scale or enabled state change, and keeps
//! its own pending damage. Failures can be injected for the next
//! `make_current` or `swap_buffers` call.

use std::cell::{Cell, RefCell};
use std::time::SystemTime;

use log::{debug, info, warn};

use super::{Output, OutputError, OutputEvents, Transform};
use crate::region::Region;

/// Default number of buffers in the simulated swapchain
pub const DEFAULT_BUFFER_COUNT: usize = 2;

#[derive(Debug)]
struct Swapchain {
    /// Present counter value at which each buffer was last shown
    presented_at: Vec<Option<u64>>,
    /// Buffer currently used as back buffer, if a context is current
    back: Option<usize>,
    next: usize,
    presents: u64,
}

impl Swapchain {
    fn new(buffer_count: usize) -> Self {
        Self {
            presented_at: vec![None; buffer_count.max(1)],
            back: None,
            next: 0,
            presents: 0,
        }
    }

    fn acquire(&mut self) -> i32 {
        let idx = *self.back.get_or_insert(self.next);
        match self.presented_at[idx] {
            Some(at) => (self.presents - at + 1) as i32,
            None => 0,
        }
    }

    fn present(&mut self) {
        let idx = self.back.take().unwrap_or(self.next);
        self.presents += 1;
        self.presented_at[idx] = Some(self.presents);
        self.next = (idx + 1) % self.presented_at.len();
    }

    /// Drops buffer contents, e.g. after a mode change reallocates them
    fn reset(&mut self) {
        self.presented_at.iter_mut().for_each(|p| *p = None);
        self.back = None;
    }
}

/// An output that renders nowhere
#[derive(Debug)]
pub struct HeadlessOutput {
    name: String,
    width: Cell<i32>,
    height: Cell<i32>,
    transform: Cell<Transform>,
    scale: Cell<f32>,
    enabled: Cell<bool>,
    needs_swap: Cell<bool>,
    damage: RefCell<Region>,
    swapchain: RefCell<Swapchain>,
    last_swap_damage: RefCell<Option<Region>>,
    last_swap_time: Cell<Option<SystemTime>>,
    frame_requests: Cell<u32>,
    swap_count: Cell<u64>,
    fail_make_current: Cell<bool>,
    fail_swap: Cell<bool>,
    destroyed: Cell<bool>,
    events: OutputEvents,
}

impl HeadlessOutput {
    pub fn new(width: i32, height: i32) -> Self {
        Self::with_buffer_count(width, height, DEFAULT_BUFFER_COUNT)
    }

    /// Creates an output whose swapchain cycles through `buffer_count` buffers
    pub fn with_buffer_count(width: i32, height: i32, buffer_count: usize) -> Self {
        info!(
            "🖥️ Creating headless output {}x{} with {} buffers",
            width, height, buffer_count
        );
        Self {
            name: String::from("HEADLESS-1"),
            width: Cell::new(width),
            height: Cell::new(height),
            transform: Cell::new(Transform::Normal),
            scale: Cell::new(1.0),
            enabled: Cell::new(true),
            needs_swap: Cell::new(false),
            damage: RefCell::new(Region::new()),
            swapchain: RefCell::new(Swapchain::new(buffer_count)),
            last_swap_damage: RefCell::new(None),
            last_swap_time: Cell::new(None),
            frame_requests: Cell::new(0),
            swap_count: Cell::new(0),
            fail_make_current: Cell::new(false),
            fail_swap: Cell::new(false),
            destroyed: Cell::new(false),
            events: OutputEvents::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Changes the mode, reallocating the swapchain and emitting `mode`
    pub fn set_mode(&self, width: i32, height: i32) {
        if (width, height) == (self.width.get(), self.height.get()) {
            return;
        }
        debug!("{}: mode {}x{}", self.name, width, height);
        self.width.set(width);
        self.height.set(height);
        self.swapchain.borrow_mut().reset();
        self.events.mode.emit(&());
    }

    pub fn set_transform(&self, transform: Transform) {
        if self.transform.replace(transform) != transform {
            debug!("{}: transform {:?}", self.name, transform);
            self.events.transform.emit(&());
        }
    }

    pub fn set_scale(&self, scale: f32) {
        if self.scale.replace(scale) != scale {
            debug!("{}: scale {}", self.name, scale);
            self.events.scale.emit(&());
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    /// Records damage originating from the backend itself
    pub fn damage(&self, region: &Region) {
        self.damage.borrow_mut().union(region);
        self.needs_swap.set(true);
        self.events.needs_swap.emit(&());
    }

    /// Forces the next frame to be presented even without damage
    pub fn set_needs_swap(&self, needs_swap: bool) {
        self.needs_swap.set(needs_swap);
    }

    /// Emits `frame`, as a vblank or frame callback would
    pub fn send_frame(&self) {
        self.frame_requests.set(0);
        self.events.frame.emit(&());
    }

    /// Number of frame requests since the last `send_frame`
    pub fn frame_requests(&self) -> u32 {
        self.frame_requests.get()
    }

    pub fn swap_count(&self) -> u64 {
        self.swap_count.get()
    }

    /// Damage passed to the last successful swap
    pub fn last_swap_damage(&self) -> Option<Region> {
        self.last_swap_damage.borrow().clone()
    }

    pub fn last_swap_time(&self) -> Option<SystemTime> {
        self.last_swap_time.get()
    }

    pub fn fail_next_make_current(&self) {
        self.fail_make_current.set(true);
    }

    pub fn fail_next_swap(&self) {
        self.fail_swap.set(true);
    }

    /// Emits `destroy`; later calls do nothing
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        info!("🗑️ Destroying output {}", self.name);
        self.events.destroy.emit(&());
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }
}

impl Output for HeadlessOutput {
    fn width(&self) -> i32 {
        self.width.get()
    }

    fn height(&self) -> i32 {
        self.height.get()
    }

    fn transform(&self) -> Transform {
        self.transform.get()
    }

    fn scale(&self) -> f32 {
        self.scale.get()
    }

    fn enabled(&self) -> bool {
        self.enabled.get()
    }

    fn needs_swap(&self) -> bool {
        self.needs_swap.get()
    }

    fn pending_damage(&self) -> Region {
        self.damage.borrow().clone()
    }

    fn make_current(&self) -> Result<i32, OutputError> {
        if self.fail_make_current.replace(false) || self.destroyed.get() {
            warn!("{}: no rendering context", self.name);
            return Err(OutputError::NoContext);
        }
        Ok(self.swapchain.borrow_mut().acquire())
    }

    fn swap_buffers(
        &self,
        when: Option<SystemTime>,
        damage: Option<&Region>,
    ) -> Result<(), OutputError> {
        if self.fail_swap.replace(false) {
            warn!("{}: swap rejected", self.name);
            return Err(OutputError::SwapFailed(format!("{} rejected the frame", self.name)));
        }
        if self.destroyed.get() {
            return Err(OutputError::SwapFailed(format!("{} is destroyed", self.name)));
        }

        self.swapchain.borrow_mut().present();
        self.swap_count.set(self.swap_count.get() + 1);
        *self.last_swap_damage.borrow_mut() = damage.cloned();
        self.last_swap_time.set(Some(when.unwrap_or_else(SystemTime::now)));
        self.needs_swap.set(false);
        self.damage.borrow_mut().clear();
        Ok(())
    }

    fn schedule_frame(&self) {
        self.frame_requests.set(self.frame_requests.get() + 1);
    }

    fn events(&self) -> &OutputEvents {
        &self.events
    }
}

impl Drop for HeadlessOutput {
    fn drop(&mut self) {
        self.destroy();
    }
}
