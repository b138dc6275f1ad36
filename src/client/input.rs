use crate::types::Direction;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Press(Direction),
    Release(Direction),
}

impl InputEvent {
    /// Maps a browser key transition to an event. Unmapped keys yield `None`.
    pub fn from_key(key: &str, pressed: bool) -> Option<Self> {
        let direction = Direction::from_key(key)?;
        Some(if pressed {
            InputEvent::Press(direction)
        } else {
            InputEvent::Release(direction)
        })
    }
}

/// Ordered record of direction key transitions seen since the last tick.
#[derive(Clone, Debug, Default)]
pub struct InputSampler {
    // oldest first
    events: Vec<InputEvent>,
}

impl InputSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a transition. Repeated presses (key auto-repeat) or releases of
    /// the same direction collapse into the first one.
    pub fn record(&mut self, event: InputEvent) {
        if !self.events.contains(&event) {
            self.events.push(event);
        }
    }

    pub fn record_key(&mut self, key: &str, pressed: bool) {
        if let Some(event) = InputEvent::from_key(key, pressed) {
            self.record(event);
        }
    }

    /// Resolves one tick: returns the direction pressed earliest, then forgets
    /// every direction whose release has been seen.
    ///
    /// A press and release inside one tick still yields one movement.
    pub fn resolve_tick(&mut self) -> Option<Direction> {
        let direction = self.events.iter().find_map(|event| match event {
            InputEvent::Press(direction) => Some(*direction),
            InputEvent::Release(_) => None,
        });

        let released: Vec<Direction> = self
            .events
            .iter()
            .filter_map(|event| match event {
                InputEvent::Release(direction) => Some(*direction),
                InputEvent::Press(_) => None,
            })
            .collect();
        self.events.retain(|event| match event {
            InputEvent::Press(direction) | InputEvent::Release(direction) => {
                !released.contains(direction)
            }
        });

        direction
    }

    pub fn held(&self) -> Vec<Direction> {
        self.events
            .iter()
            .filter_map(|event| match event {
                InputEvent::Press(direction) => Some(*direction),
                InputEvent::Release(_) => None,
            })
            .collect()
    }
}
