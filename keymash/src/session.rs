//! The typing test itself: waiting for the start key, counting presses for a fixed window and
//! showing the result.

use std::time::{Duration, Instant};
use log::{debug, info, warn};
use time::OffsetDateTime;
use keymash_gpio::{GpioError, GpioResult};
use keymash_gpio::debounce::EdgeDetector;
use keymash_gpio::matrix::{Cell, MatrixIo, MatrixScanner};
use keymash_gpio::timing::Clock;
use crate::display::{PresentationSink, Screen};

/// The fixed waits of a session.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SessionTimings {
    /// Length of the counting window.
    pub test_duration: Duration,
    /// Pause between two reads of the start key.
    pub poll_interval: Duration,
    /// Pause between releasing the start key and the window opening.
    pub rearm_delay: Duration,
    /// How long the result stays up before going back to idle.
    pub result_dwell: Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        SessionTimings {
            test_duration: Duration::from_secs(10),
            poll_interval: Duration::from_millis(10),
            rearm_delay: Duration::from_millis(100),
            result_dwell: Duration::from_secs(3),
        }
    }
}

/// The outcome of one counting window.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RoundResult {
    /// Rounds are numbered from 1 since startup.
    pub round: u32,
    pub key_count: u32,
    /// The nominal window length.
    pub duration: Duration,
    pub started: Instant,
    pub finished: Instant,
    pub bounce_releases: u32,
}

impl RoundResult {
    /// Key presses per second over the nominal window.
    pub fn speed(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.key_count as f64 / secs
        } else {
            0.0
        }
    }

    /// The speed with one decimal, as shown on screen.
    pub fn speed_text(&self) -> String {
        format!("{:.1}", self.speed())
    }

    /// How long the window actually stayed open.
    pub fn elapsed(&self) -> Duration {
        self.finished.saturating_duration_since(self.started)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SessionState {
    /// Showing the invitation, waiting for the start key to go down.
    Idle,
    /// The start key is down, waiting for it to come back up.
    Armed,
    /// Counting key presses until `end_time`.
    Running {
        start_time: Instant,
        end_time: Instant,
        key_count: u32,
    },
    /// Showing the result of the last round.
    Result(RoundResult),
}

/// The session state machine.
///
/// Owns the scanner and the edge detector, so nothing else can touch the key states while a
/// round is running. Everything happens on the caller's thread through [Self::step]; the
/// device simply calls it in a loop forever.
pub struct Session<'a, M: MatrixIo> {
    scanner: MatrixScanner<M>,
    detector: EdgeDetector,
    start_key: Cell,
    timings: SessionTimings,
    sink: &'a mut dyn PresentationSink,
    clock: &'a dyn Clock,
    state: SessionState,
    rounds: u32,
    shown: Option<Screen>,
    last_result: Option<RoundResult>,
}

impl<'a, M: MatrixIo> Session<'a, M> {
    /// Creates a new session, starting out idle.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the start key lies outside the matrix, or the detector
    ///   does not cover the same matrix as the scanner.
    pub fn new(
        scanner: MatrixScanner<M>,
        detector: EdgeDetector,
        start_key: Cell,
        timings: SessionTimings,
        sink: &'a mut dyn PresentationSink,
        clock: &'a dyn Clock,
    ) -> GpioResult<Self> {
        if start_key.row >= scanner.rows() || start_key.col >= scanner.columns() {
            return Err(GpioError::InvalidArgument);
        }
        if detector.rows() != scanner.rows() || detector.columns() != scanner.columns() {
            return Err(GpioError::InvalidArgument);
        }

        Ok(Session {
            scanner,
            detector,
            start_key,
            timings,
            sink,
            clock,
            state: SessionState::Idle,
            rounds: 0,
            shown: None,
            last_result: None,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Gets the running key count, if a round is running.
    pub fn key_count(&self) -> Option<u32> {
        match self.state {
            SessionState::Running { key_count, .. } => Some(key_count),
            _ => None,
        }
    }

    /// Gets how many rounds were started so far.
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn last_result(&self) -> Option<&RoundResult> {
        self.last_result.as_ref()
    }

    pub fn scanner(&self) -> &MatrixScanner<M> {
        &self.scanner
    }

    /// Performs one unit of work for the current state.
    ///
    /// That is a single read of the start key while idle or armed, a single scan while running,
    /// or the whole result dwell.
    pub fn step(&mut self) -> GpioResult<()> {
        match self.state {
            SessionState::Idle => {
                self.show(Screen::Invitation)?;
                if self.scanner.poll_cell(self.start_key, self.clock)? {
                    debug!("Start key {} down, waiting for release.", self.start_key);
                    self.state = SessionState::Armed;
                }
                self.clock.sleep(self.timings.poll_interval);
            }
            SessionState::Armed => {
                if self.scanner.poll_cell(self.start_key, self.clock)? {
                    self.clock.sleep(self.timings.poll_interval);
                } else {
                    self.clock.sleep(self.timings.rearm_delay);
                    self.begin_round()?;
                }
            }
            SessionState::Running { start_time, end_time, key_count } => {
                if self.clock.now() >= end_time {
                    self.finish_round(start_time, key_count)?;
                } else {
                    self.count(start_time, end_time, key_count)?;
                }
            }
            SessionState::Result(result) => {
                self.clock.sleep(self.timings.result_dwell);
                debug!("Round {} dismissed.", result.round);
                self.state = SessionState::Idle;
                self.show(Screen::Invitation)?;
            }
        }

        Ok(())
    }

    fn begin_round(&mut self) -> GpioResult<()> {
        self.detector.reset_all();
        self.rounds += 1;

        let start_time = self.clock.now();
        let end_time = start_time + self.timings.test_duration;
        self.state = SessionState::Running {
            start_time,
            end_time,
            key_count: 0,
        };

        info!("Round {} started, counting for {:?}.", self.rounds, self.timings.test_duration);
        self.show(Screen::Countdown {
            remaining_secs: self.timings.test_duration.as_secs(),
            key_count: 0,
        })
    }

    /// One scan of the running round.
    fn count(&mut self, start_time: Instant, end_time: Instant, key_count: u32) -> GpioResult<()> {
        let frame = self.scanner.scan(self.clock)?;
        let now = self.clock.now();
        let key_count = key_count + self.detector.apply(&frame, now);

        self.state = SessionState::Running {
            start_time,
            end_time,
            key_count,
        };

        self.show(Screen::Countdown {
            remaining_secs: end_time.saturating_duration_since(now).as_secs(),
            key_count,
        })
    }

    fn finish_round(&mut self, started: Instant, key_count: u32) -> GpioResult<()> {
        let result = RoundResult {
            round: self.rounds,
            key_count,
            duration: self.timings.test_duration,
            started,
            finished: self.clock.now(),
            bounce_releases: self.detector.bounce_releases(),
        };

        let finished_at = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        info!(
            "Round {} finished at {}: {} keys, {} keys/s.",
            result.round, finished_at, result.key_count, result.speed_text(),
        );
        if result.bounce_releases > 0 {
            warn!("{} release(s) came within {:?} of the press, the switch may be chattering.",
                result.bounce_releases, self.detector.debounce_threshold());
        }

        self.state = SessionState::Result(result);
        self.last_result = Some(result);
        self.show(Screen::Finished {
            key_count: result.key_count,
            speed: result.speed_text(),
        })
    }

    /// Renders the screen, unless it is exactly what is already shown.
    fn show(&mut self, screen: Screen) -> GpioResult<()> {
        if self.shown.as_ref() == Some(&screen) {
            return Ok(());
        }
        screen.render(&mut *self.sink)?;
        self.shown = Some(screen);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keymash_gpio::matrix::ScriptedMatrix;
    use keymash_gpio::timing::ManualClock;
    use crate::display::RecordingSink;

    const MS: Duration = Duration::from_millis(1);
    const START_KEY: Cell = Cell::new(2, 3);
    const OTHER_KEY: Cell = Cell::new(0, 0);

    fn session<'a>(
        clock: &'a ManualClock,
        matrix: ScriptedMatrix<'a>,
        sink: &'a mut RecordingSink,
    ) -> Session<'a, ScriptedMatrix<'a>> {
        Session::new(
            MatrixScanner::new(matrix),
            EdgeDetector::new(3, 4),
            START_KEY,
            SessionTimings::default(),
            sink,
            clock,
        ).unwrap()
    }

    /// Steps until the predicate holds, giving up after `max_steps`.
    fn step_until<M: MatrixIo>(
        session: &mut Session<'_, M>,
        max_steps: usize,
        predicate: impl Fn(&SessionState) -> bool,
    ) -> bool {
        for _ in 0..max_steps {
            if predicate(session.state()) {
                return true;
            }
            session.step().unwrap();
        }
        predicate(session.state())
    }

    fn is_running(state: &SessionState) -> bool {
        matches!(state, SessionState::Running { .. })
    }

    fn is_result(state: &SessionState) -> bool {
        matches!(state, SessionState::Result(_))
    }

    #[test]
    fn start_key_press_and_release_opens_a_round() {
        let clock = ManualClock::new();
        let mut matrix = ScriptedMatrix::new(3, 4, &clock);
        matrix.press(START_KEY, MS * 20, MS * 80);
        let mut sink = RecordingSink::default();
        let mut session = session(&clock, matrix, &mut sink);

        assert!(step_until(&mut session, 100, |s| *s == SessionState::Armed));
        assert!(clock.elapsed() >= MS * 20);

        assert!(step_until(&mut session, 100, is_running));
        assert!(clock.elapsed() >= MS * 180);
        assert_eq!(session.key_count(), Some(0));
        assert_eq!(session.rounds(), 1);

        assert_eq!(sink.frames[0], vec!["Mash the red key!!"]);
        assert_eq!(sink.frames[1], vec!["Time left: 10s", "Keys: 0"]);
    }

    #[test]
    fn held_start_key_never_starts_a_round() {
        let clock = ManualClock::new();
        let mut matrix = ScriptedMatrix::new(3, 4, &clock);
        matrix.hold(START_KEY, MS * 20);
        let mut sink = RecordingSink::default();
        let mut session = session(&clock, matrix, &mut sink);

        assert!(!step_until(&mut session, 10_000, is_running));
        assert_eq!(*session.state(), SessionState::Armed);
        assert_eq!(session.rounds(), 0);
    }

    #[test]
    fn other_keys_do_not_start_a_round() {
        let clock = ManualClock::new();
        let mut matrix = ScriptedMatrix::new(3, 4, &clock);
        matrix.tap_repeatedly(OTHER_KEY, MS * 20, 20, MS * 50, MS * 50);
        let mut sink = RecordingSink::default();
        let mut session = session(&clock, matrix, &mut sink);

        assert!(!step_until(&mut session, 1_000, |s| *s != SessionState::Idle));
        // The invitation is drawn once, not on every poll
        assert_eq!(sink.frames.len(), 1);
    }

    #[test]
    fn seven_taps_give_seven_keys_and_point_seven_per_second() {
        let clock = ManualClock::new();
        let mut matrix = ScriptedMatrix::new(3, 4, &clock);
        matrix
            .press(START_KEY, MS * 20, MS * 80)
            .tap_repeatedly(OTHER_KEY, MS * 1_000, 7, MS * 100, MS * 900);
        let mut sink = RecordingSink::default();
        let mut session = session(&clock, matrix, &mut sink);

        assert!(step_until(&mut session, 100, is_running));

        let mut previous = 0;
        while is_running(session.state()) {
            let key_count = session.key_count().unwrap();
            assert!(key_count >= previous);
            previous = key_count;
            session.step().unwrap();
        }

        let SessionState::Result(result) = *session.state() else {
            panic!("expected a result, got {:?}", session.state());
        };
        assert_eq!(result.key_count, 7);
        assert_eq!(result.speed_text(), "0.7");
        assert_eq!(result.bounce_releases, 0);

        let frames = &sink.frames;
        assert_eq!(
            frames.last().unwrap(),
            &vec!["Test finished!", "Total keys: 7", "Speed: 0.7 keys/s"],
        );
        // Redrawn on every second and every key, not on every scan
        assert!(frames.len() <= 2 + 11 + 7 + 1, "{} frames", frames.len());
    }

    #[test]
    fn key_held_for_the_whole_window_counts_once() {
        let clock = ManualClock::new();
        let mut matrix = ScriptedMatrix::new(3, 4, &clock);
        matrix
            .press(START_KEY, MS * 20, MS * 80)
            .hold(Cell::new(1, 1), Duration::ZERO);
        let mut sink = RecordingSink::default();
        let mut session = session(&clock, matrix, &mut sink);

        assert!(step_until(&mut session, 100_000, is_result));
        assert_eq!(session.last_result().unwrap().key_count, 1);
    }

    #[test]
    fn window_closes_within_one_scan_of_its_end() {
        let clock = ManualClock::new();
        let mut matrix = ScriptedMatrix::new(3, 4, &clock);
        matrix.press(START_KEY, MS * 20, MS * 80);
        let mut sink = RecordingSink::default();
        let mut session = session(&clock, matrix, &mut sink);
        let scan_latency = session.scanner().scan_latency();

        assert!(step_until(&mut session, 100_000, is_result));

        let result = session.last_result().unwrap();
        assert!(result.elapsed() >= result.duration);
        assert!(result.elapsed() <= result.duration + scan_latency);
    }

    #[test]
    fn result_goes_back_to_idle_and_the_next_round_starts_from_zero() {
        let clock = ManualClock::new();
        let mut matrix = ScriptedMatrix::new(3, 4, &clock);
        matrix
            .press(START_KEY, MS * 20, MS * 80)
            .tap_repeatedly(OTHER_KEY, MS * 1_000, 7, MS * 100, MS * 900)
            .press(START_KEY, MS * 14_000, MS * 14_060);
        let mut sink = RecordingSink::default();
        let mut session = session(&clock, matrix, &mut sink);

        assert!(step_until(&mut session, 100_000, is_result));
        let shown_at = clock.elapsed();

        session.step().unwrap();
        assert_eq!(*session.state(), SessionState::Idle);
        assert_eq!(clock.elapsed() - shown_at, Duration::from_secs(3));

        assert!(step_until(&mut session, 1_000, is_running));
        assert_eq!(session.key_count(), Some(0));
        assert_eq!(session.rounds(), 2);

        assert!(step_until(&mut session, 100_000, is_result));
        let result = session.last_result().unwrap();
        assert_eq!((result.round, result.key_count), (2, 0));
        assert_eq!(result.speed_text(), "0.0");

        let invitations = sink.frames
            .iter()
            .filter(|f| f[0] == "Mash the red key!!")
            .count();
        assert_eq!(invitations, 2);
    }

    #[test]
    fn start_key_outside_the_matrix_is_rejected() {
        let clock = ManualClock::new();
        let matrix = ScriptedMatrix::new(3, 4, &clock);
        let mut sink = RecordingSink::default();

        let result = Session::new(
            MatrixScanner::new(matrix),
            EdgeDetector::new(3, 4),
            Cell::new(3, 0),
            SessionTimings::default(),
            &mut sink,
            &clock,
        );
        assert_eq!(result.err(), Some(GpioError::InvalidArgument));
    }
}
