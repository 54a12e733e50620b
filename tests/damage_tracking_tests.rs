//! Damage tracking integration tests for wlframe
//!
//! Drives OutputDamage through the public API against a headless output and
//! checks the accumulated damage against a plain model of committed frames.

use std::cell::Cell;
use std::rc::Rc;

use proptest::prelude::*;
use wlframe::output::{HeadlessOutput, Output};
use wlframe::region::{Rect, Region};
use wlframe::{OutputDamage, Transform, HISTORY_LEN};

const WIDTH: i32 = 100;
const HEIGHT: i32 = 100;

fn full() -> Region {
    Region::from_rect(Rect::new(0, 0, WIDTH, HEIGHT))
}

fn rect_strategy() -> impl Strategy<Value = Rect> {
    (-50i32..150, -50i32..150, 0i32..80, 0i32..80).prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
}

/// Committed damage the tracker should remember, newest last
#[derive(Default)]
struct Model {
    current: Region,
    committed: Vec<Region>,
}

impl Model {
    fn add(&mut self, rect: Rect) {
        self.current.union_rect(rect);
        self.current.intersect_rect(Rect::new(0, 0, WIDTH, HEIGHT));
    }

    fn expected(&self, age: i32) -> Region {
        if age <= 0 || (age - 1) as usize > HISTORY_LEN {
            return full();
        }
        let mut damage = self.current.clone();
        for past in self.committed.iter().rev().take((age - 1) as usize) {
            damage.union(past);
        }
        damage
    }

    fn swap(&mut self) {
        self.committed.push(std::mem::take(&mut self.current));
    }
}

proptest! {
    #[test]
    fn prop_current_stays_inside_output(rects in prop::collection::vec(rect_strategy(), 1..20)) {
        let output = Rc::new(HeadlessOutput::new(WIDTH, HEIGHT));
        let damage = OutputDamage::new(&output);

        for rect in rects {
            damage.add_box(rect);
            prop_assert!(full().contains_region(&damage.current()));
        }
    }

    #[test]
    fn prop_damage_matches_history_model(
        frames in prop::collection::vec(prop::collection::vec(rect_strategy(), 0..4), 1..12),
        buffers in 1usize..=4,
    ) {
        let output = Rc::new(HeadlessOutput::with_buffer_count(WIDTH, HEIGHT, buffers));
        let damage = OutputDamage::new(&output);
        let mut model = Model::default();

        for rects in frames {
            for rect in rects {
                damage.add_box(rect);
                model.add(rect);
            }

            let frame = damage.make_current().unwrap();
            prop_assert_eq!(&frame.damage, &model.expected(frame.buffer_age));

            damage.swap_buffers(None, Some(&frame.damage)).unwrap();
            model.swap();
            prop_assert!(damage.current().is_empty());
        }
    }
}

#[test]
fn test_first_frame_scenario() {
    let output = Rc::new(HeadlessOutput::new(WIDTH, HEIGHT));
    let damage = OutputDamage::new(&output);

    damage.add_box(Rect::new(10, 10, 20, 20));
    let frame = damage.make_current().unwrap();
    assert_eq!(frame.buffer_age, 0);
    assert!(frame.needs_swap);
    assert_eq!(frame.damage, full());

    damage.swap_buffers(None, Some(&frame.damage)).unwrap();
    assert!(damage.current().is_empty());
    // The accumulated box is committed, not the full repaint
    assert_eq!(
        damage.history(0),
        Some(Region::from_rect(Rect::new(10, 10, 20, 20)))
    );
    assert_eq!(output.last_swap_damage(), Some(full()));
}

#[test]
fn test_failed_swap_is_retryable() {
    let output = Rc::new(HeadlessOutput::new(WIDTH, HEIGHT));
    let damage = OutputDamage::new(&output);
    damage.add_box(Rect::new(0, 0, 10, 10));
    let frame = damage.make_current().unwrap();
    damage.swap_buffers(None, Some(&frame.damage)).unwrap();

    damage.add_box(Rect::new(50, 50, 10, 10));
    let before = (damage.current(), damage.history(0), damage.history(1));

    output.fail_next_swap();
    let frame = damage.make_current().unwrap();
    assert!(damage.swap_buffers(None, Some(&frame.damage)).is_err());
    assert_eq!((damage.current(), damage.history(0), damage.history(1)), before);

    let frame = damage.make_current().unwrap();
    damage.swap_buffers(None, Some(&frame.damage)).unwrap();
    assert_eq!(damage.history(0), Some(before.0));
}

#[test]
fn test_lost_context_leaves_state_alone() {
    let output = Rc::new(HeadlessOutput::new(WIDTH, HEIGHT));
    let damage = OutputDamage::new(&output);
    damage.add_box(Rect::new(5, 5, 5, 5));

    output.fail_next_make_current();
    assert!(damage.make_current().is_err());
    assert_eq!(damage.current(), Region::from_rect(Rect::new(5, 5, 5, 5)));
}

#[test]
fn test_mode_change_damages_new_size() {
    let output = Rc::new(HeadlessOutput::new(WIDTH, HEIGHT));
    let damage = OutputDamage::new(&output);

    output.set_mode(200, 50);
    assert_eq!(damage.current(), Region::from_rect(Rect::new(0, 0, 200, 50)));
    assert!(output.frame_requests() > 0);
}

#[test]
fn test_rotation_clips_to_transformed_box() {
    let output = Rc::new(HeadlessOutput::new(200, 100));
    let damage = OutputDamage::new(&output);
    output.set_transform(Transform::Rotated90);

    assert_eq!(damage.current(), Region::from_rect(Rect::new(0, 0, 100, 200)));
    damage.add_box(Rect::new(90, 150, 50, 100));
    assert!(Region::from_rect(Rect::new(0, 0, 100, 200)).contains_region(&damage.current()));
}

#[test]
fn test_backend_damage_is_merged() {
    let output = Rc::new(HeadlessOutput::new(WIDTH, HEIGHT));
    let damage = OutputDamage::new(&output);

    output.damage(&Region::from_rect(Rect::new(20, 20, 5, 5)));
    assert_eq!(damage.current(), Region::from_rect(Rect::new(20, 20, 5, 5)));
}

#[test]
fn test_frame_forwarding_follows_enabled_state() {
    let output = Rc::new(HeadlessOutput::new(WIDTH, HEIGHT));
    let damage = OutputDamage::new(&output);
    let frames = Rc::new(Cell::new(0));
    {
        let frames = Rc::clone(&frames);
        damage.events().frame.add(move |_| frames.set(frames.get() + 1));
    }

    output.set_enabled(false);
    output.send_frame();
    assert_eq!(frames.get(), 0);

    output.set_enabled(true);
    output.send_frame();
    assert_eq!(frames.get(), 1);
}

#[test]
fn test_teardown_through_output_and_explicitly() {
    let output = Rc::new(HeadlessOutput::new(WIDTH, HEIGHT));
    let damage = OutputDamage::new(&output);
    let destroyed = Rc::new(Cell::new(0));
    {
        let destroyed = Rc::clone(&destroyed);
        damage.events().destroy.add(move |_| destroyed.set(destroyed.get() + 1));
    }

    output.destroy();
    damage.destroy();
    assert_eq!(destroyed.get(), 1);
    assert!(damage.is_destroyed());
    assert!(output.events().frame.is_empty());
    assert!(output.events().mode.is_empty());
}

#[test]
fn test_dropping_output_first() {
    let output = Rc::new(HeadlessOutput::new(WIDTH, HEIGHT));
    let damage = OutputDamage::new(&output);

    drop(output);
    assert!(damage.is_destroyed());
    assert!(damage.output().is_none());
    damage.add_whole();
    assert!(damage.current().is_empty());
}
