//! Cooperative periodic task scheduler driven by one hardware alarm.
//!
//! Every tick, each task's elapsed time grows by one tick. The tasks are then
//! scanned **in registration order** and only the **first** one whose elapsed
//! time has reached its period runs; its elapsed time is reduced modulo its
//! period and the scan stops. At most one task therefore runs per tick, which
//! bounds the work done inside the interrupt and makes registration order the
//! priority order.
//!
//! A task that keeps losing to higher-priority tasks is not dropped: its
//! elapsed time keeps growing until it finally wins a tick. Missed deadlines
//! are neither detected nor recovered.

use heapless::Vec;

use crate::error::ConfigError;

/// A repeating hardware alarm.
///
/// Implemented by the firmware on top of a timer peripheral. The scheduler
/// only needs to arm it once and to acknowledge/re-arm it at the start of
/// every interrupt.
pub trait Alarm {
    /// Start firing every `tick_us` microseconds.
    fn arm(&mut self, tick_us: u32);

    /// Clear the pending interrupt flag and schedule the next tick.
    fn acknowledge(&mut self);
}

/// One periodic job owned by the [`Scheduler`].
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Task<T> {
    period_us: u32,
    elapsed_us: u64,
    action: T,
}

impl<T> Task<T> {
    /// Period between runs in microseconds.
    pub fn period_us(&self) -> u32 {
        self.period_us
    }

    /// Time accumulated since the task last ran (modulo its period).
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }

    /// The action run when the task triggers.
    pub fn action(&self) -> &T {
        &self.action
    }

    fn advance(&mut self, tick_us: u32) {
        self.elapsed_us = self.elapsed_us.saturating_add(tick_us as u64);
    }

    fn triggered(&mut self) -> bool {
        let period = self.period_us as u64;
        if self.elapsed_us >= period {
            self.elapsed_us %= period;
            return true;
        }
        false
    }
}

/// Fixed-tick, first-ready-wins task scheduler.
///
/// `T` is the action type: a closure for [`run_tick`](Self::run_tick), or a
/// plain `Copy` label that the interrupt handler dispatches with `match`.
///
/// # Examples
///
/// ```
/// use hexboard_core::Scheduler;
///
/// #[derive(Clone, Copy, Debug, PartialEq)]
/// enum Job { Audio, Rotary, Keys }
///
/// let mut scheduler: Scheduler<Job, 3> = Scheduler::new(16).unwrap();
/// scheduler.register(32, Job::Audio).unwrap();
/// scheduler.register(768, Job::Rotary).unwrap();
/// scheduler.register(16, Job::Keys).unwrap();
///
/// // First tick: only the key scan is due.
/// assert_eq!(scheduler.tick().copied(), Some(Job::Keys));
/// // Second tick: audio and keys are both due, audio wins.
/// assert_eq!(scheduler.tick().copied(), Some(Job::Audio));
/// ```
pub struct Scheduler<T, const N: usize> {
    tick_us: u32,
    tasks: Vec<Task<T>, N>,
    started: bool,
}

impl<T, const N: usize> Scheduler<T, N> {
    /// Create an empty scheduler with the given tick.
    ///
    /// Returns [`ConfigError::ZeroPeriod`] if `tick_us` is zero.
    pub fn new(tick_us: u32) -> Result<Self, ConfigError> {
        if tick_us == 0 {
            return Err(ConfigError::ZeroPeriod);
        }
        Ok(Self {
            tick_us,
            tasks: Vec::new(),
            started: false,
        })
    }

    /// The fixed tick in microseconds.
    pub fn tick_us(&self) -> u32 {
        self.tick_us
    }

    /// Returns `true` once [`start`](Self::start) has armed the alarm.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Registered tasks, in priority order.
    pub fn tasks(&self) -> &[Task<T>] {
        &self.tasks
    }

    /// Append a task. Earlier registrations have higher priority.
    ///
    /// # Errors
    /// * [`ConfigError::AlreadyStarted`] after [`start`](Self::start)
    /// * [`ConfigError::ZeroPeriod`] if `period_us` is zero
    /// * [`ConfigError::TooManyTasks`] if all `N` slots are used
    pub fn register(&mut self, period_us: u32, action: T) -> Result<(), ConfigError> {
        if self.started {
            return Err(ConfigError::AlreadyStarted);
        }
        if period_us == 0 {
            return Err(ConfigError::ZeroPeriod);
        }
        self.tasks
            .push(Task {
                period_us,
                elapsed_us: 0,
                action,
            })
            .map_err(|_| ConfigError::TooManyTasks)
    }

    /// Arm the repeating alarm. The task list is frozen from here on.
    pub fn start<A: Alarm>(&mut self, alarm: &mut A) -> Result<(), ConfigError> {
        if self.started {
            return Err(ConfigError::AlreadyStarted);
        }
        self.started = true;
        alarm.arm(self.tick_us);

        #[cfg(feature = "defmt")]
        defmt::info!(
            "scheduler started: tick={}us, {} tasks",
            self.tick_us,
            self.tasks.len()
        );

        Ok(())
    }

    /// Interrupt entry point.
    ///
    /// Acknowledges and re-arms the alarm *before* any bookkeeping so that
    /// the next tick is not delayed by the work done here, then performs
    /// one [`tick`](Self::tick).
    pub fn on_interrupt<A: Alarm>(&mut self, alarm: &mut A) -> Option<&mut T> {
        alarm.acknowledge();
        self.tick()
    }

    /// Advance every task by one tick and return the first due task's action.
    pub fn tick(&mut self) -> Option<&mut T> {
        let tick_us = self.tick_us;
        for task in self.tasks.iter_mut() {
            task.advance(tick_us);
        }
        self.tasks
            .iter_mut()
            .find_map(|task| task.triggered().then_some(&mut task.action))
    }
}

impl<F, const N: usize> Scheduler<F, N>
where
    F: FnMut(),
{
    /// Run one tick and execute the winning closure, if any.
    ///
    /// Returns `true` if a task ran.
    pub fn run_tick(&mut self) -> bool {
        match self.tick() {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Job {
        Audio,
        Rotary,
        Keys,
    }

    #[derive(Default)]
    struct FakeAlarm {
        armed_with: Option<u32>,
        acknowledged: u32,
    }

    impl Alarm for FakeAlarm {
        fn arm(&mut self, tick_us: u32) {
            self.armed_with = Some(tick_us);
        }

        fn acknowledge(&mut self) {
            self.acknowledged += 1;
        }
    }

    fn board_scheduler() -> Scheduler<Job, 3> {
        let mut s = Scheduler::new(16).unwrap();
        s.register(32, Job::Audio).unwrap();
        s.register(768, Job::Rotary).unwrap();
        s.register(16, Job::Keys).unwrap();
        s
    }

    /// Run `ticks` ticks and count how often each job ran.
    fn run(s: &mut Scheduler<Job, 3>, ticks: usize) -> [usize; 3] {
        let mut counts = [0; 3];
        for _ in 0..ticks {
            if let Some(job) = s.tick() {
                counts[*job as usize] += 1;
            }
        }
        counts
    }

    // ── Registration ─────────────────────────────────────────────────

    #[test]
    fn rejects_zero_tick_and_period() {
        assert!(matches!(
            Scheduler::<Job, 1>::new(0),
            Err(ConfigError::ZeroPeriod)
        ));
        let mut s: Scheduler<Job, 1> = Scheduler::new(16).unwrap();
        assert_eq!(s.register(0, Job::Audio), Err(ConfigError::ZeroPeriod));
    }

    #[test]
    fn rejects_tasks_beyond_capacity() {
        let mut s: Scheduler<Job, 1> = Scheduler::new(16).unwrap();
        s.register(32, Job::Audio).unwrap();
        assert_eq!(s.register(32, Job::Keys), Err(ConfigError::TooManyTasks));
    }

    #[test]
    fn start_arms_alarm_once_and_freezes_task_list() {
        let mut s = board_scheduler();
        let mut alarm = FakeAlarm::default();

        s.start(&mut alarm).unwrap();
        assert_eq!(alarm.armed_with, Some(16));
        assert!(s.is_started());

        assert_eq!(s.start(&mut alarm), Err(ConfigError::AlreadyStarted));
        assert_eq!(s.register(64, Job::Keys), Err(ConfigError::AlreadyStarted));
    }

    #[test]
    fn interrupt_acknowledges_before_running() {
        let mut s = board_scheduler();
        let mut alarm = FakeAlarm::default();
        s.start(&mut alarm).unwrap();

        let job = s.on_interrupt(&mut alarm).copied();
        assert_eq!(alarm.acknowledged, 1);
        assert_eq!(job, Some(Job::Keys));
    }

    // ── Tick semantics ───────────────────────────────────────────────

    #[test]
    fn at_most_one_task_per_tick_in_priority_order() {
        let mut s = board_scheduler();

        // Tick 1: keys only (16 >= 16).
        assert_eq!(s.tick().copied(), Some(Job::Keys));
        // Tick 2: audio (32) and keys (16) both due; audio is registered first.
        assert_eq!(s.tick().copied(), Some(Job::Audio));
        // Keys lost the previous tick, so it now carries 32 µs and runs.
        assert_eq!(s.tick().copied(), Some(Job::Keys));
        assert_eq!(s.tasks()[2].elapsed_us(), 0);
    }

    #[test]
    fn losing_task_keeps_accumulating() {
        let mut s: Scheduler<Job, 2> = Scheduler::new(16).unwrap();
        s.register(16, Job::Audio).unwrap();
        s.register(40, Job::Keys).unwrap();

        // Audio wins every tick, keys starves and accumulates.
        for _ in 0..5 {
            assert_eq!(s.tick().copied(), Some(Job::Audio));
        }
        assert_eq!(s.tasks()[1].elapsed_us(), 80);
    }

    #[test]
    fn board_schedule_serves_every_job() {
        let mut s = board_scheduler();
        // 48 ticks = one rotary period.
        let counts = run(&mut s, 48 * 10);

        assert_eq!(counts[Job::Audio as usize], 240);
        assert!(counts[Job::Rotary as usize] >= 9);
        assert!(counts[Job::Keys as usize] >= 200);
    }

    #[test]
    fn starvation_only_when_higher_priority_due_every_tick() {
        // Audio due on every tick starves everything below it.
        let mut greedy: Scheduler<Job, 2> = Scheduler::new(16).unwrap();
        greedy.register(16, Job::Audio).unwrap();
        greedy.register(32, Job::Keys).unwrap();
        let mut ran_keys = false;
        for _ in 0..1000 {
            if greedy.tick().copied() == Some(Job::Keys) {
                ran_keys = true;
            }
        }
        assert!(!ran_keys);
        assert_eq!(greedy.tasks()[1].elapsed_us(), 16_000);

        // Give the higher-priority task a single idle tick in every window
        // of ceil(P_keys / tick) = 2 ticks and the lower task is served.
        let mut fair: Scheduler<Job, 2> = Scheduler::new(16).unwrap();
        fair.register(32, Job::Audio).unwrap();
        fair.register(32, Job::Keys).unwrap();
        let mut last_keys = 0;
        for t in 1..=1000usize {
            if fair.tick().copied() == Some(Job::Keys) {
                last_keys = t;
            }
            // Both periods are 2 ticks, so keys must never wait longer
            // than two windows.
            assert!(t - last_keys <= 4);
        }
    }

    #[test]
    fn run_tick_executes_closures() {
        let mut hits = 0u32;
        {
            let mut s: Scheduler<_, 1> = Scheduler::new(10).unwrap();
            s.register(20, || hits += 1).unwrap();
            assert!(!s.run_tick());
            assert!(s.run_tick());
            assert!(!s.run_tick());
            assert!(s.run_tick());
        }
        assert_eq!(hits, 2);
    }
}
