use bevy::prelude::*;

use crate::movement::{MovementMode, TransitionKind};

/// Animation handles the movement code asks to play.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Montage {
    TransitionTallMantle,
    TransitionShortMantle,
    TallMantle,
    ShortMantle,
    ProxyTallMantle,
    ProxyShortMantle,
    TransitionHang,
    WallJump,
    Dash,
}

/// Something observable that happened during a simulated step. Events are
/// collected by the step and handed to listeners after it completes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SimEvent {
    ModeChanged { from: MovementMode, to: MovementMode },
    Landed,
    Jumped,
    DashStarted,
    DashRejected,
    TransitionStarted(TransitionKind),
    TransitionFinished(TransitionKind),
    PlayMontage { montage: Montage, speed: f32 },
}

pub trait EventSink {
    fn notify(&mut self, event: &SimEvent);
}

impl<F> EventSink for F
where
    F: FnMut(&SimEvent),
{
    fn notify(&mut self, event: &SimEvent) {
        self(event)
    }
}

/// Observers invoked synchronously, in registration order.
#[derive(Default)]
pub struct MovementListeners {
    sinks: Vec<Box<dyn EventSink + Send + Sync>>,
}

impl MovementListeners {
    pub fn add(&mut self, sink: impl EventSink + Send + Sync + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn dispatch(&mut self, events: &[SimEvent]) {
        for event in events {
            for sink in &mut self.sinks {
                sink.notify(event);
            }
        }
    }
}

/// Fire-and-forget animation playback.
pub trait AnimationSink {
    fn play(&mut self, montage: Montage, speed: f32);
}

/// Records what was played. Used headless and in tests.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimationLog {
    pub played: Vec<(Montage, f32)>,
}

impl AnimationSink for AnimationLog {
    fn play(&mut self, montage: Montage, speed: f32) {
        debug!("montage {:?} at {:.2}x", montage, speed);
        self.played.push((montage, speed));
    }
}

/// Edge-triggered cosmetic flags. Observers replay the effect once per
/// toggle; the simulation itself never reads them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ProxyFlags {
    pub dash: bool,
    pub short_mantle: bool,
    pub tall_mantle: bool,
}

/// Watches a remote character's proxy flags and plays each edge once.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProxyObserver {
    last: ProxyFlags,
}

impl ProxyObserver {
    pub fn new(initial: ProxyFlags) -> Self {
        Self { last: initial }
    }

    pub fn observe(&mut self, flags: ProxyFlags, animation: &mut dyn AnimationSink) -> usize {
        let mut played = 0;
        if flags.dash != self.last.dash {
            animation.play(Montage::Dash, 1.0);
            played += 1;
        }
        if flags.short_mantle != self.last.short_mantle {
            animation.play(Montage::ProxyShortMantle, 1.0);
            played += 1;
        }
        if flags.tall_mantle != self.last.tall_mantle {
            animation.play(Montage::ProxyTallMantle, 1.0);
            played += 1;
        }
        self.last = flags;
        played
    }
}
