use crate::matrix::{Cell, ScanFrame};
use log::{debug, trace};
use std::time::{Duration, Instant};

/// What the detector remembers about one key between scans.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CellState {
    pub pressed: bool,
    /// When the key last changed state, `None` right after a reset.
    pub last_transition: Option<Instant>,
}

/// How a key was released.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Release {
    /// The key had been stable for longer than the debounce threshold.
    Clean,
    /// The key was released within the debounce threshold of its last transition, which
    /// usually means contact chatter.
    Bounce,
}

/// Per-key edge detector for a whole matrix.
///
/// Every key counts once per continuous press: a rising edge (inactive to active) yields one
/// event, however many scans the key stays down for. Releases are classified as [Release::Clean]
/// or [Release::Bounce] against the debounce threshold, but bounces are only counted, never
/// suppressed.
#[derive(Debug)]
pub struct EdgeDetector {
    rows: usize,
    cols: usize,
    states: Vec<CellState>,
    debounce_threshold: Duration,
    bounce_releases: u32,
}

impl EdgeDetector {
    pub const DEFAULT_DEBOUNCE_THRESHOLD: Duration = Duration::from_millis(50);

    /// Creates a detector for a `rows` x `cols` matrix with every key released.
    pub fn new(rows: usize, cols: usize) -> Self {
        EdgeDetector {
            rows,
            cols,
            states: vec![CellState::default(); rows * cols],
            debounce_threshold: Self::DEFAULT_DEBOUNCE_THRESHOLD,
            bounce_releases: 0,
        }
    }

    pub fn with_debounce_threshold(mut self, debounce_threshold: Duration) -> Self {
        self.debounce_threshold = debounce_threshold;
        self
    }

    pub fn debounce_threshold(&self) -> Duration {
        self.debounce_threshold
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.cols
    }

    /// Gets the state of a key, or `None` if it lies outside the matrix.
    pub fn state(&self, cell: Cell) -> Option<CellState> {
        if cell.row < self.rows && cell.col < self.cols {
            Some(self.states[cell.row * self.cols + cell.col])
        } else {
            None
        }
    }

    /// Gets how many releases since the last reset came within the debounce threshold.
    pub fn bounce_releases(&self) -> u32 {
        self.bounce_releases
    }

    /// Classifies a release happening at `now` for a key in the given state.
    pub fn classify_release(&self, state: &CellState, now: Instant) -> Release {
        match state.last_transition {
            Some(at) if now.saturating_duration_since(at) <= self.debounce_threshold => Release::Bounce,
            _ => Release::Clean,
        }
    }

    /// Feeds one scan into the detector and returns the amount of new key presses in it.
    ///
    /// Cells the frame does not cover are treated as inactive.
    pub fn apply(&mut self, frame: &ScanFrame, now: Instant) -> u32 {
        let mut events = 0;

        for row in 0..self.rows {
            for col in 0..self.cols {
                let cell = Cell::new(row, col);
                let index = row * self.cols + col;
                let active = frame.is_active(cell);
                let state = self.states[index];

                match (active, state.pressed) {
                    (true, false) => {
                        trace!("{} pressed", cell);
                        self.states[index] = CellState {
                            pressed: true,
                            last_transition: Some(now),
                        };
                        events += 1;
                    }
                    (false, true) => {
                        if self.classify_release(&state, now) == Release::Bounce {
                            debug!("{} released within {:?}, likely bouncing", cell, self.debounce_threshold);
                            self.bounce_releases += 1;
                        }
                        self.states[index] = CellState {
                            pressed: false,
                            last_transition: Some(now),
                        };
                    }
                    _ => {}
                }
            }
        }

        events
    }

    /// Forgets every latched press, so keys held right now count again on the next scan.
    pub fn reset_all(&mut self) {
        self.states.fill(CellState::default());
        self.bounce_releases = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    fn frame(cells: &[Cell]) -> ScanFrame {
        cells
            .iter()
            .fold(ScanFrame::new(3, 4), |frame, &cell| frame.with(cell, true))
    }

    #[test]
    fn held_key_counts_once() {
        let mut detector = EdgeDetector::new(3, 4);
        let start = Instant::now();
        let held = frame(&[Cell::new(1, 1)]);

        let total: u32 = (0..100)
            .map(|i| detector.apply(&held, start + MS * 5 * i))
            .sum();

        assert_eq!(total, 1);
        assert!(detector.state(Cell::new(1, 1)).unwrap().pressed);
    }

    #[test]
    fn every_press_after_a_release_counts() {
        let mut detector = EdgeDetector::new(3, 4);
        let start = Instant::now();
        let down = frame(&[Cell::new(0, 0)]);
        let up = frame(&[]);

        let mut total = 0;
        for i in 0..7 {
            total += detector.apply(&down, start + MS * 200 * i);
            total += detector.apply(&up, start + MS * (200 * i + 100));
        }

        assert_eq!(total, 7);
        assert_eq!(detector.bounce_releases(), 0);
    }

    #[test]
    fn reset_makes_held_keys_count_again() {
        let mut detector = EdgeDetector::new(3, 4);
        let now = Instant::now();
        let held = frame(&[Cell::new(2, 3)]);

        assert_eq!(detector.apply(&held, now), 1);
        assert_eq!(detector.apply(&held, now + MS), 0);

        detector.reset_all();
        assert_eq!(detector.state(Cell::new(2, 3)), Some(CellState::default()));
        assert_eq!(detector.apply(&held, now + MS * 2), 1);
    }

    #[test]
    fn simultaneous_keys_count_independently() {
        let now = Instant::now();

        let mut detector = EdgeDetector::new(3, 4);
        assert_eq!(detector.apply(&frame(&[Cell::new(0, 2), Cell::new(1, 2)]), now), 2);

        let mut detector = EdgeDetector::new(3, 4);
        assert_eq!(detector.apply(&frame(&[Cell::new(1, 2), Cell::new(0, 2)]), now), 2);

        let mut detector = EdgeDetector::new(3, 4);
        assert_eq!(detector.apply(&frame(&[Cell::new(0, 0), Cell::new(2, 3)]), now), 2);
    }

    #[test]
    fn quick_releases_are_classified_as_bounces() {
        let mut detector = EdgeDetector::new(3, 4).with_debounce_threshold(MS * 50);
        let start = Instant::now();
        let down = frame(&[Cell::new(0, 1)]);
        let up = frame(&[]);

        detector.apply(&down, start);
        detector.apply(&up, start + MS * 10);
        assert_eq!(detector.bounce_releases(), 1);

        // A bouncing contact still produces an event on each new rising edge
        assert_eq!(detector.apply(&down, start + MS * 12), 1);
        detector.apply(&up, start + MS * 100);
        assert_eq!(detector.bounce_releases(), 1);

        let state = CellState { pressed: true, last_transition: Some(start) };
        assert_eq!(detector.classify_release(&state, start + MS * 50), Release::Bounce);
        assert_eq!(detector.classify_release(&state, start + MS * 51), Release::Clean);

        detector.reset_all();
        assert_eq!(detector.bounce_releases(), 0);
    }

    #[test]
    fn cells_missing_from_a_smaller_frame_read_as_released() {
        let mut detector = EdgeDetector::new(3, 4);
        let now = Instant::now();

        assert_eq!(detector.apply(&frame(&[Cell::new(2, 3)]), now), 1);
        assert_eq!(detector.apply(&ScanFrame::new(1, 1), now + MS * 100), 0);
        assert!(!detector.state(Cell::new(2, 3)).unwrap().pressed);
        assert_eq!(detector.state(Cell::new(3, 0)), None);
    }
}
