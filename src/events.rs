use std::collections::VecDeque;

use bevy::prelude::*;
use serde::Serialize;

/// Upper bound on buffered events; older entries are discarded first.
const EVENT_CAPACITY: usize = 256;

/// One structured entry in the run trace: solve lifecycle, executor
/// actions, motion state transitions, completion.
#[derive(Serialize, Clone, Debug)]
pub struct GameEvent {
    pub name: String,
    pub data: serde_json::Value,
    pub frame: u64,
}

/// Bounded ring of recent gameplay events. Systems emit into it; hosts
/// and tests read it back as the observable trace of a run.
#[derive(Resource, Default)]
pub struct GameEventBus {
    buffer: VecDeque<GameEvent>,
    pub frame: u64,
    pub dropped: u64,
}

impl GameEventBus {
    pub fn emit(&mut self, name: impl Into<String>, data: serde_json::Value) {
        if self.buffer.len() == EVENT_CAPACITY {
            self.buffer.pop_front();
            self.dropped += 1;
        }
        self.buffer.push_back(GameEvent {
            name: name.into(),
            data,
            frame: self.frame,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameEvent> {
        self.buffer.iter()
    }

    pub fn last_named(&self, name: &str) -> Option<&GameEvent> {
        self.buffer.iter().rev().find(|e| e.name == name)
    }

    pub fn count_named(&self, name: &str) -> usize {
        self.buffer.iter().filter(|e| e.name == name).count()
    }
}

pub struct GameEventsPlugin;

impl Plugin for GameEventsPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(GameEventBus::default())
            .add_systems(FixedUpdate, advance_event_frame);
    }
}

fn advance_event_frame(mut bus: ResMut<GameEventBus>) {
    bus.frame = bus.frame.saturating_add(1);
}
