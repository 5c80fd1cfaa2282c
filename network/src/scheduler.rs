//! Retransmission scheduler: an ordered list of pending-send tasks with
//! exponential backoff.
//!
//! Grounded on spec.md §4.4 (`TaskManager`/`Task` in the source's
//! `Structures.hpp`). spec.md §9 flags the source's scheduler mutex as
//! commented out — a requirement defect. We serialize all mutation through
//! `&mut self`, so `run`/`add`/`remove` must all execute on the single I/O
//! thread (spec.md §5); there is no internal locking to work around.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::pool::PacketHandle;

pub const INITIAL_TIMEOUT: Duration = Duration::from_millis(2);
pub const MAX_TIMEOUT: Duration = Duration::from_millis(1024);

pub type TaskId = u64;

pub struct Task {
    pub id: TaskId,
    pub fragments: Vec<PacketHandle>,
    pub last_fragment_len: usize,
    pub receivers: Vec<SocketAddr>,
    pub broadcast: bool,
    next_launch: Instant,
    timeout: Duration,
}

impl Task {
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

pub struct TaskScheduler {
    tasks: Vec<Task>,
    next_id: TaskId,
}

impl TaskScheduler {
    pub fn new() -> Self {
        TaskScheduler { tasks: Vec::new(), next_id: 0 }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn add(
        &mut self,
        fragments: Vec<PacketHandle>,
        last_fragment_len: usize,
        receivers: Vec<SocketAddr>,
        broadcast: bool,
        now: Instant,
    ) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.push(Task {
            id,
            fragments,
            last_fragment_len,
            receivers,
            broadcast,
            next_launch: now,
            timeout: INITIAL_TIMEOUT,
        });
        id
    }

    pub fn remove(&mut self, id: TaskId) {
        self.tasks.retain(|t| t.id != id);
    }

    /// Drops every pending retransmission. Called on round transitions to
    /// abandon stale tasks (spec.md §5, "Cancellation").
    pub fn remove_all(&mut self) {
        self.tasks.clear();
    }

    /// Visits every task whose `next_launch <= now`, invoking `f` with it
    /// (the caller performs the actual send to every receiver), then
    /// advances the task's schedule: `next_launch += timeout_just_used`,
    /// and updates `timeout` for the next firing per spec.md §4.4/§8's
    /// invariant #4 (x4, capped at 1024ms, reset to the 2ms initial once
    /// the cap itself was the timeout just used).
    pub fn run(&mut self, now: Instant, mut f: impl FnMut(&Task)) {
        for task in self.tasks.iter_mut() {
            if task.next_launch > now {
                continue;
            }
            f(task);
            let used = task.timeout;
            task.next_launch = now + used;
            task.timeout = if used >= MAX_TIMEOUT {
                INITIAL_TIMEOUT
            } else {
                (used * 4).min(MAX_TIMEOUT)
            };
        }
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_follows_the_x4_cap_reset_sequence() {
        let mut scheduler = TaskScheduler::new();
        let now = Instant::now();
        scheduler.add(Vec::new(), 0, Vec::new(), false, now);

        let expected = [2u64, 8, 32, 128, 512, 1024, 2, 8];
        let mut observed = Vec::new();
        let mut clock = now;
        for _ in 0..expected.len() {
            scheduler.run(clock, |task| observed.push(task.timeout().as_millis() as u64));
            clock += Duration::from_millis(2000);
        }
        assert_eq!(observed, expected);
    }

    #[test]
    fn task_does_not_fire_before_its_next_launch() {
        let mut scheduler = TaskScheduler::new();
        let now = Instant::now();
        scheduler.add(Vec::new(), 0, Vec::new(), false, now);

        let mut fired = 0;
        scheduler.run(now, |_| fired += 1);
        assert_eq!(fired, 1);
        // Immediately re-running at the same instant should not re-fire:
        // next_launch was pushed to now + 2ms.
        scheduler.run(now, |_| fired += 1);
        assert_eq!(fired, 1);
    }

    #[test]
    fn remove_all_drops_every_task() {
        let mut scheduler = TaskScheduler::new();
        let now = Instant::now();
        scheduler.add(Vec::new(), 0, Vec::new(), false, now);
        scheduler.add(Vec::new(), 0, Vec::new(), true, now);
        assert_eq!(scheduler.len(), 2);
        scheduler.remove_all();
        assert!(scheduler.is_empty());
    }

    #[test]
    fn remove_by_id_drops_only_that_task() {
        let mut scheduler = TaskScheduler::new();
        let now = Instant::now();
        let a = scheduler.add(Vec::new(), 0, Vec::new(), false, now);
        let _b = scheduler.add(Vec::new(), 0, Vec::new(), false, now);
        scheduler.remove(a);
        assert_eq!(scheduler.len(), 1);
    }
}
