use std::time::Instant;

/// Policy for advancing the water animation clock each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeStep {
    /// Add a fixed increment per frame regardless of wall-clock time.
    /// The scene animates at its authored speed only on displays whose
    /// refresh rate matches the increment.
    Fixed(f32),
    /// Add the measured wall-clock delta since the previous frame.
    Measured,
}

impl TimeStep {
    /// One tick of the historical 60 Hz cadence.
    pub const DEFAULT_INCREMENT: f32 = 1.0 / 60.0;
}

impl Default for TimeStep {
    fn default() -> Self {
        TimeStep::Fixed(Self::DEFAULT_INCREMENT)
    }
}

/// Per-frame animation clock. `time` never decreases.
#[derive(Debug)]
pub struct FrameClock {
    step: TimeStep,
    time: f32,
    frames: u64,
    last_instant: Option<Instant>,
}

impl FrameClock {
    pub fn new(step: TimeStep) -> Self {
        Self {
            step,
            time: 0.0,
            frames: 0,
            last_instant: None,
        }
    }

    /// Advances the clock by one frame and returns the new time value.
    pub fn advance(&mut self) -> f32 {
        let delta = match self.step {
            TimeStep::Fixed(step) => step.max(0.0),
            TimeStep::Measured => {
                let now = Instant::now();
                let delta = self
                    .last_instant
                    .map(|last| now.duration_since(last).as_secs_f32())
                    .unwrap_or(0.0);
                self.last_instant = Some(now);
                delta
            }
        };
        self.time += delta;
        self.frames += 1;
        self.time
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(TimeStep::default())
    }
}

/// Drives `frames` iterations of the render loop against `submit`.
///
/// Each iteration advances the clock first and then submits exactly once,
/// so every submission observes the just-incremented time value. The
/// windowed path runs the same sequence once per redraw; this form exists
/// so the loop can be exercised without a GPU.
pub fn run_frames<F>(clock: &mut FrameClock, frames: u64, mut submit: F)
where
    F: FnMut(f32),
{
    for _ in 0..frames {
        let time = clock.advance();
        submit(time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_step_accumulates_exactly() {
        let mut clock = FrameClock::default();
        for frame in 1..=600u64 {
            let time = clock.advance();
            assert!((time - frame as f32 / 60.0).abs() < 1e-3);
        }
        assert_eq!(clock.frames(), 600);
        assert!((clock.time() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn time_never_decreases() {
        let mut clock = FrameClock::new(TimeStep::Measured);
        let mut previous = 0.0;
        for _ in 0..32 {
            let time = clock.advance();
            assert!(time >= previous);
            previous = time;
        }
    }

    #[test]
    fn one_submission_per_frame_with_time_already_advanced() {
        let mut clock = FrameClock::default();
        let mut submissions = 0u64;
        let mut seen = Vec::new();
        run_frames(&mut clock, 600, |time| {
            submissions += 1;
            seen.push(time);
        });
        assert_eq!(submissions, 600);
        assert_eq!(clock.frames(), 600);
        assert!((clock.time() - 10.0).abs() < 1e-3);
        // First submission already observes the first increment.
        assert!((seen[0] - 1.0 / 60.0).abs() < 1e-6);
        assert_eq!(*seen.last().unwrap(), clock.time());
    }

    #[test]
    fn measured_first_frame_adds_nothing() {
        let mut clock = FrameClock::new(TimeStep::Measured);
        assert_eq!(clock.advance(), 0.0);
        assert_eq!(clock.frames(), 1);
    }
}
