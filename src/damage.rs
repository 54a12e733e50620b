//! Buffer-age driven damage tracking for a single output
//!
//! [`OutputDamage`] accumulates the screen area invalidated since the last
//! presented frame and remembers what was damaged on each of the last
//! [`HISTORY_LEN`] frames. When the compositor is about to draw, the back
//! buffer's age tells how many frames of damage that buffer missed, so only
//! that area has to be repainted.
//!
//! # Frame loop
//!
//! ```
//! use std::rc::Rc;
//! use wlframe::damage::OutputDamage;
//! use wlframe::output::HeadlessOutput;
//! use wlframe::region::Rect;
//!
//! let output = Rc::new(HeadlessOutput::new(100, 100));
//! let damage = OutputDamage::new(&output);
//!
//! damage.add_box(Rect::new(10, 10, 20, 20));
//!
//! let frame = damage.make_current()?;
//! if frame.needs_swap {
//!     // draw the surfaces intersecting `frame.damage` here
//!     damage.swap_buffers(None, Some(&frame.damage))?;
//! }
//! # Ok::<(), wlframe::damage::DamageError>(())
//! ```
//!
//! The tracker subscribes to the output's lifecycle signals. Mode, transform
//! and scale changes damage the whole output, backend damage is merged in,
//! `frame` is forwarded through [`DamageEvents::frame`] while the output is
//! enabled, and `destroy` tears the tracker down.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::SystemTime;

use log::{debug, trace, warn};
use thiserror::Error;

use crate::output::{Output, OutputError};
use crate::region::{Rect, Region};
use crate::signal::{ListenerId, Signal};

/// Number of past frames whose damage is retained
pub const HISTORY_LEN: usize = 2;

/// Errors returned by [`OutputDamage`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DamageError {
    #[error("output damage tracker was destroyed")]
    Destroyed,
    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Signals emitted by a damage tracker
#[derive(Debug, Default)]
pub struct DamageEvents {
    /// A new frame should be drawn
    pub frame: Signal<()>,
    /// The tracker is about to be torn down
    pub destroy: Signal<()>,
}

/// Result of [`OutputDamage::make_current`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDamage {
    /// Whether the frame has to be drawn and presented
    pub needs_swap: bool,
    /// Area of the back buffer that has to be repainted
    pub damage: Region,
    /// Age reported by the output for the back buffer
    pub buffer_age: i32,
}

#[derive(Debug)]
struct State {
    current: Region,
    history: [Region; HISTORY_LEN],
    /// Slot holding the most recently committed damage
    history_idx: usize,
    destroyed: bool,
}

impl State {
    fn new() -> Self {
        Self {
            current: Region::new(),
            history: Default::default(),
            history_idx: 0,
            destroyed: false,
        }
    }

    fn history(&self, age: usize) -> &Region {
        &self.history[(self.history_idx + age) % HISTORY_LEN]
    }
}

#[derive(Debug, Clone, Copy)]
struct Subscriptions {
    destroy: ListenerId,
    mode: ListenerId,
    transform: ListenerId,
    scale: ListenerId,
    needs_swap: ListenerId,
    frame: ListenerId,
}

struct Shared<O: ?Sized> {
    output: Weak<O>,
    state: RefCell<State>,
    subscriptions: Cell<Option<Subscriptions>>,
    events: DamageEvents,
}

impl<O: Output + ?Sized> Shared<O> {
    fn is_destroyed(&self) -> bool {
        self.state.borrow().destroyed
    }

    /// Returns the output if the tracker is still live
    fn live_output(&self) -> Result<Rc<O>, DamageError> {
        if self.is_destroyed() {
            return Err(DamageError::Destroyed);
        }
        self.output.upgrade().ok_or(DamageError::Output(OutputError::Gone))
    }

    /// Unions `region` into the pending damage, clips it and schedules a frame
    fn accumulate(&self, region: &Region) {
        let output = match self.live_output() {
            Ok(output) => output,
            Err(e) => {
                debug!("Ignoring damage: {}", e);
                return;
            }
        };

        {
            let mut state = self.state.borrow_mut();
            state.current.union(region);
            state.current.intersect_rect(output.transformed_box());
        }
        output.schedule_frame();
    }

    fn add_whole(&self) {
        let Some(output) = self.output.upgrade() else {
            return;
        };
        trace!("Damaging whole output {:?}", output.transformed_resolution());
        self.accumulate(&Region::from_rect(output.transformed_box()));
    }

    fn handle_needs_swap(&self) {
        if let Some(output) = self.output.upgrade() {
            self.accumulate(&output.pending_damage());
        }
    }

    fn handle_frame(&self) {
        if self.is_destroyed() {
            return;
        }
        match self.output.upgrade() {
            Some(output) if output.enabled() => self.events.frame.emit(&()),
            _ => trace!("Swallowing frame for disabled output"),
        }
    }

    fn destroy(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
        }
        debug!("🗑️ Destroying output damage tracker");

        self.events.destroy.emit(&());

        if let Some(subs) = self.subscriptions.take() {
            match self.output.upgrade() {
                Some(output) => {
                    let events = output.events();
                    events.destroy.remove(subs.destroy);
                    events.mode.remove(subs.mode);
                    events.transform.remove(subs.transform);
                    events.scale.remove(subs.scale);
                    events.needs_swap.remove(subs.needs_swap);
                    events.frame.remove(subs.frame);
                }
                // The output is mid-drop and its signals go with it
                None => debug!("Output already dropped, skipping unsubscribe"),
            }
        }

        let mut state = self.state.borrow_mut();
        state.current = Region::new();
        state.history = Default::default();
    }
}

/// Damage tracker bound to one output
///
/// Dropping the tracker destroys it. Destruction is idempotent, so it is safe
/// to call [`OutputDamage::destroy`] explicitly and also have the output's
/// `destroy` signal fire.
pub struct OutputDamage<O: Output + ?Sized + 'static> {
    shared: Rc<Shared<O>>,
}

impl<O: Output + ?Sized + 'static> OutputDamage<O> {
    /// Creates a tracker and subscribes it to the output's lifecycle signals
    pub fn new(output: &Rc<O>) -> Self {
        let shared = Rc::new(Shared {
            output: Rc::downgrade(output),
            state: RefCell::new(State::new()),
            subscriptions: Cell::new(None),
            events: DamageEvents::default(),
        });

        let subscribe = |signal: &Signal<()>, handler: fn(&Shared<O>)| {
            let weak = Rc::downgrade(&shared);
            signal.add(move |_| {
                if let Some(shared) = weak.upgrade() {
                    handler(&shared);
                }
            })
        };

        let events = output.events();
        let subs = Subscriptions {
            destroy: subscribe(&events.destroy, Shared::destroy),
            mode: subscribe(&events.mode, Shared::add_whole),
            transform: subscribe(&events.transform, Shared::add_whole),
            scale: subscribe(&events.scale, Shared::add_whole),
            needs_swap: subscribe(&events.needs_swap, Shared::handle_needs_swap),
            frame: subscribe(&events.frame, Shared::handle_frame),
        };
        shared.subscriptions.set(Some(subs));

        debug!(
            "Created output damage tracker for {:?} output",
            output.transformed_resolution()
        );
        Self { shared }
    }

    /// Adds a region of damage in output pixel coordinates
    pub fn add(&self, region: &Region) {
        self.shared.accumulate(region);
    }

    /// Damages the whole output
    pub fn add_whole(&self) {
        self.shared.add_whole();
    }

    /// Adds a single rectangle of damage
    pub fn add_box(&self, rect: Rect) {
        self.shared.accumulate(&Region::from_rect(rect));
    }

    /// Makes the output's context current and computes the area to repaint
    ///
    /// A buffer of unknown age, or older than the retained history, needs a
    /// full repaint. Otherwise the damage is the pending damage plus the
    /// damage of every frame the buffer missed. Tracker state is not
    /// modified; only [`OutputDamage::swap_buffers`] commits.
    pub fn make_current(&self) -> Result<FrameDamage, DamageError> {
        let output = self.shared.live_output()?;
        let buffer_age = output.make_current()?;

        let damage = if buffer_age <= 0 || (buffer_age - 1) as usize > HISTORY_LEN {
            trace!("Buffer age {} unusable, repainting whole output", buffer_age);
            Region::from_rect(output.transformed_box())
        } else {
            let state = self.shared.state.borrow();
            let mut damage = state.current.clone();
            for age in 0..(buffer_age - 1) as usize {
                damage.union(state.history(age));
            }
            damage
        };

        let needs_swap = output.needs_swap() || !damage.is_empty();
        Ok(FrameDamage {
            needs_swap,
            damage,
            buffer_age,
        })
    }

    /// Presents the frame and commits the pending damage to history
    ///
    /// On failure the tracker is left untouched so the frame can be retried.
    pub fn swap_buffers(
        &self,
        when: Option<SystemTime>,
        damage: Option<&Region>,
    ) -> Result<(), DamageError> {
        let output = self.shared.live_output()?;
        if let Err(e) = output.swap_buffers(when, damage) {
            warn!("Failed to swap buffers: {}", e);
            return Err(e.into());
        }

        let mut guard = self.shared.state.borrow_mut();
        let state = &mut *guard;
        state.history_idx = (state.history_idx + HISTORY_LEN - 1) % HISTORY_LEN;
        state.history[state.history_idx] = std::mem::take(&mut state.current);
        Ok(())
    }

    /// Emits `destroy` and detaches from the output; later calls do nothing
    pub fn destroy(&self) {
        self.shared.destroy();
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.is_destroyed()
    }

    pub fn events(&self) -> &DamageEvents {
        &self.shared.events
    }

    /// Damage accumulated since the last successful swap
    pub fn current(&self) -> Region {
        self.shared.state.borrow().current.clone()
    }

    /// Damage committed `frames_ago + 1` swaps ago
    ///
    /// Returns `None` when `frames_ago` is beyond the retained history.
    pub fn history(&self, frames_ago: usize) -> Option<Region> {
        (frames_ago < HISTORY_LEN).then(|| self.shared.state.borrow().history(frames_ago).clone())
    }

    /// The bound output, unless it has been dropped
    pub fn output(&self) -> Option<Rc<O>> {
        self.shared.output.upgrade()
    }
}

impl<O: Output + ?Sized + 'static> Drop for OutputDamage<O> {
    fn drop(&mut self) {
        self.shared.destroy();
    }
}

impl<O: Output + ?Sized + 'static> fmt::Debug for OutputDamage<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("OutputDamage")
            .field("current", &state.current)
            .field("history_idx", &state.history_idx)
            .field("destroyed", &state.destroyed)
            .finish()
    }
}
