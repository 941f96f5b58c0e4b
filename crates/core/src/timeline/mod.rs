//! Deterministic single-threaded timer queue.
//!
//! Every periodic callback in the pipeline (capture delivery, animation
//! ticks, progress polls, display refresh) is a repeating task registered
//! here. The host advances time explicitly and dispatches due tasks one at a
//! time, so a task cancelled by an earlier callback can never fire afterwards.

use std::time::Duration;

/// Handle to a registered repeating task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

/// Which component a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Capture,
    Animation,
    Progress,
    Display,
}

/// A task that became due while advancing the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    pub id: TaskId,
    pub kind: TaskKind,
    pub at: Duration,
}

#[derive(Debug, Clone)]
struct RepeatingTask {
    id: TaskId,
    kind: TaskKind,
    period: Duration,
    next_due: Duration,
}

const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Vec<RepeatingTask>,
    next_id: u64,
    now: Duration,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current position of the timeline, measured from its creation.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Registers a task that first fires after `delay` and then every
    /// `period`. Periods shorter than one millisecond are clamped.
    pub fn schedule(&mut self, kind: TaskKind, delay: Duration, period: Duration) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.tasks.push(RepeatingTask {
            id,
            kind,
            period: period.max(MIN_PERIOD),
            next_due: self.now + delay,
        });
        tracing::trace!(?id, ?kind, ?period, "scheduled repeating task");
        id
    }

    /// Registers a task whose first run is one period from now.
    pub fn schedule_repeating(&mut self, kind: TaskKind, period: Duration) -> TaskId {
        self.schedule(kind, period, period)
    }

    /// Removes the task. Returns false when it was already gone, which makes
    /// repeated cancellation harmless.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|task| task.id != id);
        let removed = self.tasks.len() != before;
        if removed {
            tracing::trace!(?id, "cancelled repeating task");
        }
        removed
    }

    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.tasks.iter().any(|task| task.id == id)
    }

    /// Number of live tasks of the given kind.
    pub fn count(&self, kind: TaskKind) -> usize {
        self.tasks.iter().filter(|task| task.kind == kind).count()
    }

    /// Pops the earliest task due at or before `until`, moving the clock to
    /// its deadline and re-arming it for the next period. Ties fire in
    /// registration order.
    pub fn pop_due(&mut self, until: Duration) -> Option<Fired> {
        let task = self
            .tasks
            .iter_mut()
            .filter(|task| task.next_due <= until)
            .min_by_key(|task| (task.next_due, task.id))?;

        let fired = Fired {
            id: task.id,
            kind: task.kind,
            at: task.next_due,
        };
        task.next_due += task.period;
        self.now = self.now.max(fired.at);
        Some(fired)
    }

    /// Moves the clock forward once every due task has been dispatched.
    pub fn settle(&mut self, until: Duration) {
        self.now = self.now.max(until);
    }
}
