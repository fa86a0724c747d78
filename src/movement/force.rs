use bevy::prelude::*;

/// Generational handle into a [`ForceArena`]. A removed source invalidates
/// its handle even if the slot is later reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ForceHandle {
    index: u32,
    generation: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ForceKind {
    /// Move along start -> (via) -> target over the source's duration
    MoveTo {
        start: Vec3,
        via: Option<Vec3>,
        target: Vec3,
    },
    ConstantVelocity(Vec3),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ForceSource {
    pub kind: ForceKind,
    pub duration: f32,
    pub elapsed: f32,
    stamp: u64,
}

impl ForceSource {
    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration
    }

    fn position_at(&self, alpha: f32) -> Option<Vec3> {
        let ForceKind::MoveTo { start, via, target } = self.kind else {
            return None;
        };
        let Some(via) = via else {
            return Some(start.lerp(target, alpha));
        };
        let first = start.distance(via);
        let total = first + via.distance(target);
        if total <= f32::EPSILON {
            return Some(target);
        }
        let travelled = total * alpha;
        if travelled <= first {
            Some(start.lerp(via, travelled / first.max(f32::EPSILON)))
        } else {
            let second = total - first;
            Some(via.lerp(target, (travelled - first) / second.max(f32::EPSILON)))
        }
    }
}

/// Force application service the transition controller talks to.
pub trait ForceApplication {
    fn apply_force_move(&mut self, start: Vec3, target: Vec3, duration: f32) -> ForceHandle;
    fn remove(&mut self, handle: ForceHandle) -> bool;
    /// A handle that no longer resolves counts as finished.
    fn is_finished(&self, handle: ForceHandle) -> bool;
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Slot {
    generation: u32,
    source: Option<ForceSource>,
}

/// Owns every active root-motion-like source of one character. Part of the
/// replayable state, so it is cloned into snapshots.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ForceArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    next_stamp: u64,
}

impl ForceArena {
    pub fn insert(&mut self, kind: ForceKind, duration: f32) -> ForceHandle {
        let source = ForceSource {
            kind,
            duration: duration.max(0.0),
            elapsed: 0.0,
            stamp: self.next_stamp,
        };
        self.next_stamp += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.source = Some(source);
            return ForceHandle {
                index,
                generation: slot.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            source: Some(source),
        });
        ForceHandle {
            index: self.slots.len() as u32 - 1,
            generation: 0,
        }
    }

    pub fn apply_burst(&mut self, velocity: Vec3, duration: f32) -> ForceHandle {
        self.insert(ForceKind::ConstantVelocity(velocity), duration)
    }

    pub fn apply_path(&mut self, start: Vec3, via: Vec3, target: Vec3, duration: f32) -> ForceHandle {
        self.insert(
            ForceKind::MoveTo {
                start,
                via: Some(via),
                target,
            },
            duration,
        )
    }

    pub fn get(&self, handle: ForceHandle) -> Option<&ForceSource> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.source.as_ref()
    }

    pub fn contains(&self, handle: ForceHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.source.is_some()).count()
    }

    /// Velocity imposed this step by the most recently applied unfinished
    /// source, bringing a move-to source exactly onto its path point.
    pub fn override_velocity(&self, location: Vec3, delta_time: f32) -> Option<Vec3> {
        let source = self
            .slots
            .iter()
            .filter_map(|slot| slot.source.as_ref())
            .filter(|source| !source.is_finished())
            .max_by_key(|source| source.stamp)?;

        match source.kind {
            ForceKind::ConstantVelocity(velocity) => Some(velocity),
            ForceKind::MoveTo { .. } => {
                if delta_time <= f32::EPSILON {
                    return Some(Vec3::ZERO);
                }
                let alpha = if source.duration <= f32::EPSILON {
                    1.0
                } else {
                    ((source.elapsed + delta_time) / source.duration).min(1.0)
                };
                let point = source.position_at(alpha)?;
                Some((point - location) / delta_time)
            }
        }
    }

    pub fn advance(&mut self, delta_time: f32) {
        for source in self.slots.iter_mut().filter_map(|slot| slot.source.as_mut()) {
            source.elapsed += delta_time;
        }
    }

    /// Remove every source, invalidating all outstanding handles.
    pub fn clear(&mut self) {
        for index in 0..self.slots.len() {
            let handle = ForceHandle {
                index: index as u32,
                generation: self.slots[index].generation,
            };
            self.remove(handle);
        }
    }
}

impl ForceApplication for ForceArena {
    fn apply_force_move(&mut self, start: Vec3, target: Vec3, duration: f32) -> ForceHandle {
        self.insert(
            ForceKind::MoveTo {
                start,
                via: None,
                target,
            },
            duration,
        )
    }

    fn remove(&mut self, handle: ForceHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if slot.generation != handle.generation || slot.source.is_none() {
            return false;
        }
        slot.source = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        true
    }

    fn is_finished(&self, handle: ForceHandle) -> bool {
        self.get(handle).is_none_or(ForceSource::is_finished)
    }
}
