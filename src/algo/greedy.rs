use crate::core::{
    Category, Instance, Optimality, Outcome, Schedule, Scheduler, Solution, SolveError, TaskStatus,
    EPSILON,
};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{self, AtomicBool};
use std::sync::{Barrier, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Event-driven list scheduler with one worker thread per resource category.
///
/// Lanes share a single simulated clock. Every round each lane admits what it
/// can at the current time, then all lanes agree on the earliest pending
/// completion and advance to it together. Status changes go through one
/// mutex-guarded board, so a dependency only counts once its completion has
/// been processed and the result does not depend on thread interleaving.
#[derive(Clone, Debug, Default)]
pub struct Greedy;

/// Schedule of a greedy run with the final status of every task.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct GreedyRun<'a> {
    pub schedule: Schedule<'a>,
    pub statuses: Vec<TaskStatus>,
}

impl Greedy {
    /// Runs the simulation on a private status table.
    ///
    /// # Errors
    /// - If a lane worker panics.
    pub fn run<'a>(&self, instance: &'a Instance) -> Result<GreedyRun<'a>, SolveError> {
        let lanes: Vec<_> = instance
            .lanes()
            .iter()
            .map(|(&category, tasks)| Lane::new(instance, category, tasks))
            .collect();

        let mut schedule = Schedule::new(instance);
        if lanes.is_empty() {
            return Ok(GreedyRun {
                schedule,
                statuses: Vec::new(),
            });
        }

        let board = Mutex::new(Board::new(instance.tasks().len(), lanes.len()));
        let barrier = Barrier::new(lanes.len());
        let aborted = AtomicBool::new(false);

        let admitted = std::thread::scope(|scope| {
            let handles: Vec<_> = lanes
                .into_iter()
                .enumerate()
                .map(|(slot, lane)| {
                    let sync = Rounds::new(&barrier, &aborted);
                    let board = &board;
                    scope.spawn(move || lane.run(slot, board, sync))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().map_err(|_| SolveError::WorkerPanicked))
                .collect::<Result<Vec<_>, _>>()
        })?;

        for (task, start) in admitted.into_iter().flatten() {
            schedule.schedule(task, start);
        }

        let statuses = board.into_inner().unwrap_or_else(PoisonError::into_inner).statuses;
        Ok(GreedyRun { schedule, statuses })
    }
}

impl Scheduler for Greedy {
    fn schedule<'a>(&mut self, instance: &'a Instance) -> Result<Outcome<'a>, SolveError> {
        let run = self.run(instance)?;
        debug_assert!(run.schedule.verify(), "Greedy schedule is invalid");

        let never_admitted = run.schedule.unscheduled();
        if !never_admitted.is_empty() {
            let tasks = instance.tasks();
            let ids: Vec<_> = never_admitted.iter().map(|&task| &tasks[task].id).collect();
            warn!(?ids, "greedy scheduler never admitted some tasks");
        }

        info!(
            placed = run.schedule.len(),
            score = run.schedule.calculate_score(),
            makespan = run.schedule.makespan(),
            "greedy schedule finished"
        );

        Ok(Outcome::Scheduled(Solution::new(
            run.schedule,
            Optimality::Heuristic,
        )))
    }

    fn name(&self) -> &'static str {
        "Greedy"
    }
}

#[allow(unsafe_code)]
#[linkme::distributed_slice(super::SCHEDULERS)]
static INSTANCE: fn(&crate::config::Settings) -> Box<dyn Scheduler> = |_| Box::new(Greedy);

/// State shared by all lanes.
#[derive(Debug)]
struct Board {
    statuses: Vec<TaskStatus>,
    next_events: Vec<Option<u64>>,
}

impl Board {
    fn new(tasks: usize, lanes: usize) -> Self {
        Self {
            statuses: vec![TaskStatus::NotStarted; tasks],
            next_events: vec![None; lanes],
        }
    }
}

fn lock(board: &Mutex<Board>) -> MutexGuard<'_, Board> {
    board.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Round barrier of the lanes with an abort flag.
///
/// A lane that panics inside its loop raises the flag and takes its place in
/// the round everyone else is waiting on, so the other lanes wake up, see the
/// flag and stop instead of blocking forever.
struct Rounds<'b> {
    barrier: &'b Barrier,
    aborted: &'b AtomicBool,
    armed: bool,
}

impl<'b> Rounds<'b> {
    const fn new(barrier: &'b Barrier, aborted: &'b AtomicBool) -> Self {
        Self {
            barrier,
            aborted,
            armed: true,
        }
    }

    /// Waits for the other lanes. Returns false once a lane has aborted.
    fn wait(&self) -> bool {
        self.barrier.wait();
        !self.aborted.load(atomic::Ordering::SeqCst)
    }

    /// Called once a lane has left its loop and takes part in no more rounds.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Rounds<'_> {
    fn drop(&mut self) {
        if self.armed && std::thread::panicking() {
            self.aborted.store(true, atomic::Ordering::SeqCst);
            self.barrier.wait();
        }
    }
}

/// Compares tasks by priority descending, then by release time ascending.
fn admission_order(instance: &Instance, first: usize, second: usize) -> Ordering {
    let (a, b) = (&instance.tasks()[first], &instance.tasks()[second]);
    b.priority
        .total_cmp(&a.priority)
        .then_with(|| a.earliest_start.cmp(&b.earliest_start))
}

/// Admission loop of one category.
#[derive(Debug)]
struct Lane<'a> {
    instance: &'a Instance,
    category: Category,
    capacity: f64,
    usage: f64,
    pending: Vec<usize>,
    running: BinaryHeap<Reverse<(u64, usize)>>,
    admitted: Vec<(usize, u64)>,
}

impl<'a> Lane<'a> {
    fn new(instance: &'a Instance, category: Category, tasks: &[usize]) -> Self {
        let mut pending = tasks.to_vec();
        pending.sort_by(|&a, &b| admission_order(instance, a, b));

        Self {
            instance,
            category,
            capacity: instance.capacity(category),
            usage: 0.0,
            pending,
            running: BinaryHeap::new(),
            admitted: Vec::new(),
        }
    }

    fn run(mut self, slot: usize, board: &Mutex<Board>, mut sync: Rounds<'_>) -> Vec<(usize, u64)> {
        let mut now = 0;

        loop {
            {
                let mut board = lock(board);
                self.admit(now, &mut board.statuses);
                board.next_events[slot] = self.running.peek().map(|Reverse((end, _))| *end);
            }
            if !sync.wait() {
                break;
            }

            let next = lock(board).next_events.iter().flatten().min().copied();
            if !sync.wait() {
                break;
            }

            let Some(next) = next else {
                break;
            };
            now = next;

            self.complete(now, &mut lock(board).statuses);
            if !sync.wait() {
                break;
            }
        }
        sync.disarm();

        debug!(category = %self.category, left = self.pending.len(), "lane finished");
        self.admitted
    }

    /// Admits pending tasks in priority order while capacity allows.
    fn admit(&mut self, now: u64, statuses: &mut [TaskStatus]) {
        let instance = self.instance;
        let tasks = instance.tasks();
        let mut index = 0;

        while index < self.pending.len() {
            let task = self.pending[index];
            let info = &tasks[task];

            let fits = self.usage + info.demand <= self.capacity + EPSILON;
            let ready = instance
                .dependencies(task)
                .iter()
                .all(|&dependency| statuses[dependency] == TaskStatus::Completed);

            if fits && ready {
                let start = info.earliest_start.max(now);
                let end = start + info.duration;

                self.usage += info.demand;
                statuses[task] = TaskStatus::Running;
                self.running.push(Reverse((end, task)));
                self.admitted.push((task, start));
                self.pending.remove(index);

                debug!(task = %info.id, category = %self.category, start, end, "admitted");
            } else {
                index += 1;
            }
        }
    }

    /// Releases every running task that ends by `now`.
    fn complete(&mut self, now: u64, statuses: &mut [TaskStatus]) {
        while let Some(&Reverse((end, task))) = self.running.peek() {
            if end > now {
                break;
            }
            self.running.pop();
            self.usage = (self.usage - self.instance.tasks()[task].demand).max(0.0);
            statuses[task] = TaskStatus::Completed;
        }

        if self.running.is_empty() {
            self.usage = 0.0;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::{Task, TaskId};
    use crate::data::samples;
    use std::collections::BTreeMap;

    fn limits() -> BTreeMap<Category, f64> {
        BTreeMap::from([(Category::A, 5.0), (Category::B, 5.0)])
    }

    fn start_of(run: &GreedyRun, id: &str) -> Option<u64> {
        let task = run.schedule.instance().position(&TaskId::from(id))?;
        run.schedule.get_schedule(task).map(|slot| slot.start)
    }

    #[test]
    fn test_greedy() {
        assert!(samples(false, &mut Greedy).is_ok());
    }

    #[test]
    fn serializes_tasks_sharing_a_category() -> anyhow::Result<()> {
        let tasks = vec![
            Task::new("a1", Category::A, 0, 2, 10.0, 3.0),
            Task::new("a2", Category::A, 0, 2, 1.0, 3.0),
            Task::new("b1", Category::B, 0, 2, 10.0, 3.0),
            Task::new("b2", Category::B, 0, 2, 1.0, 3.0),
        ];
        let instance = Instance::new(tasks, limits())?;
        let run = Greedy.run(&instance)?;

        assert_eq!(start_of(&run, "a1"), Some(0));
        assert_eq!(start_of(&run, "b1"), Some(0));
        assert_eq!(start_of(&run, "a2"), Some(2));
        assert_eq!(start_of(&run, "b2"), Some(2));
        assert!(run.schedule.verify());
        assert!((run.schedule.calculate_score() - 22.0).abs() < EPSILON);
        assert!(run.statuses.iter().all(|&status| status == TaskStatus::Completed));
        Ok(())
    }

    #[test]
    fn dependency_must_complete_first() -> anyhow::Result<()> {
        let tasks = vec![
            Task::new("x", Category::A, 0, 1, 10.0, 1.0).with_dependencies(["y"]),
            Task::new("y", Category::A, 0, 3, 1.0, 1.0),
        ];
        let instance = Instance::new(tasks, limits())?;
        let run = Greedy.run(&instance)?;

        assert_eq!(start_of(&run, "y"), Some(0));
        assert_eq!(start_of(&run, "x"), Some(3));
        assert!(run.schedule.verify());
        Ok(())
    }

    #[test]
    fn dependency_across_categories() -> anyhow::Result<()> {
        let tasks = vec![
            Task::new("x", Category::B, 0, 2, 10.0, 1.0).with_dependencies(["y"]),
            Task::new("y", Category::A, 1, 3, 1.0, 1.0),
            Task::new("z", Category::B, 0, 1, 1.0, 1.0),
        ];
        let instance = Instance::new(tasks, limits())?;
        let run = Greedy.run(&instance)?;

        assert_eq!(start_of(&run, "y"), Some(1));
        assert_eq!(start_of(&run, "z"), Some(0));
        assert_eq!(start_of(&run, "x"), Some(4));
        assert!(run.schedule.verify());
        Ok(())
    }

    #[test]
    fn unstarted_dependency_blocks_dependent() -> anyhow::Result<()> {
        let tasks = vec![
            Task::new("big", Category::A, 0, 1, 1.0, 9.0),
            Task::new("child", Category::B, 0, 1, 10.0, 1.0).with_dependencies(["big"]),
            Task::new("free", Category::B, 0, 1, 1.0, 1.0),
        ];
        let instance = Instance::new(tasks, limits())?;
        let run = Greedy.run(&instance)?;

        assert_eq!(start_of(&run, "big"), None);
        assert_eq!(start_of(&run, "child"), None);
        assert_eq!(start_of(&run, "free"), Some(0));
        assert_eq!(
            run.statuses,
            vec![TaskStatus::NotStarted, TaskStatus::NotStarted, TaskStatus::Completed]
        );

        let outcome = Greedy.schedule(&instance)?;
        let Some(solution) = outcome.into_solution() else {
            panic!("greedy always returns a schedule");
        };
        let unscheduled: Vec<_> = solution.unscheduled().into_iter().map(TaskId::as_str).collect();
        assert_eq!(unscheduled, ["big", "child"]);
        Ok(())
    }

    #[test]
    fn runs_are_deterministic() -> anyhow::Result<()> {
        let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(7);
        let limits = BTreeMap::from([
            (Category::A, 10.0),
            (Category::B, 8.0),
            (Category::C, 6.0),
            (Category::D, 4.0),
        ]);
        let generator = crate::generate::TaskGenerator::new(40, 3);
        let instance = Instance::new(generator.generate(&mut rng, &limits), limits)?;

        let first = Greedy.run(&instance)?;
        for _ in 0..5 {
            let again = Greedy.run(&instance)?;
            assert_eq!(first.schedule, again.schedule);
            assert_eq!(first.statuses, again.statuses);
        }
        assert!(first.schedule.verify());
        Ok(())
    }

    #[test]
    fn panicking_lane_releases_the_others() {
        let barrier = Barrier::new(3);
        let aborted = AtomicBool::new(false);

        let finished: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..3)
                .map(|lane| {
                    let mut sync = Rounds::new(&barrier, &aborted);
                    scope.spawn(move || {
                        let mut rounds = 0;
                        while sync.wait() {
                            rounds += 1;
                            assert!(lane != 0 || rounds < 2, "lane failure");
                        }
                        sync.disarm();
                        rounds
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().ok()).collect()
        });

        assert_eq!(finished, [None, Some(2), Some(2)]);
        assert!(aborted.load(atomic::Ordering::SeqCst));
    }

    #[test]
    fn empty_instance_gives_empty_schedule() -> anyhow::Result<()> {
        let instance = Instance::empty(limits());
        let outcome = Greedy.schedule(&instance)?;
        assert!(outcome.schedule().is_some_and(Schedule::is_empty));
        Ok(())
    }
}
