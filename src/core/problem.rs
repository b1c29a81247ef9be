use super::InstanceError;
use ahash::{HashMap, HashMapExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Display, Formatter};

/// Opaque task identifier. The canonical task order is ascending id.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a new task id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.into())
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resource category. Each category is an independent pool with its own capacity.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, clap::ValueEnum,
)]
pub enum Category {
    A,
    B,
    C,
    D,
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        };
        f.write_str(name)
    }
}

/// Runtime status of a task during a greedy simulation.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum TaskStatus {
    #[default]
    NotStarted,
    Running,
    Completed,
}

/// A task. Identity, timing and demand never change during a run.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub category: Category,
    pub earliest_start: u64,
    pub duration: u64,
    pub priority: f64,
    pub demand: f64,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
}

impl Task {
    /// Creates a task without dependencies.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        category: Category,
        earliest_start: u64,
        duration: u64,
        priority: f64,
        demand: f64,
    ) -> Self {
        Self {
            id: TaskId::new(id),
            category,
            earliest_start,
            duration,
            priority,
            demand,
            dependencies: Vec::new(),
        }
    }

    /// Replaces the dependencies of the task.
    #[must_use]
    pub fn with_dependencies<I, T>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(TaskId::new).collect();
        self
    }
}

/// Largest serial horizon an instance may have. Keeps every `start + duration`
/// within `u64`.
pub const MAX_TIME: u64 = u64::MAX / 2;

/// Time bound used by the strategies that discretize start times.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum Horizon {
    /// `max(earliest_start + duration)` over all tasks.
    Release,
    /// `max(earliest_start) + sum(duration)`. Always leaves room to run
    /// every placeable task one after another.
    #[default]
    Serial,
}

#[derive(Deserialize, Serialize)]
struct RawInstance {
    tasks: Vec<Task>,
    limits: BTreeMap<Category, f64>,
}

/// A validated instance of the scheduling problem.
///
/// Tasks are stored as an arena in canonical (ascending id) order and every
/// lookup structure is built once, so strategies work on indices.
#[non_exhaustive]
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(try_from = "RawInstance", into = "RawInstance")]
pub struct Instance {
    tasks: Vec<Task>,
    limits: BTreeMap<Category, f64>,
    index: HashMap<TaskId, usize>,
    dependencies: Vec<Vec<usize>>,
    lanes: BTreeMap<Category, Vec<usize>>,
    topological: Vec<usize>,
}

impl Instance {
    /// Validates the tasks and limits and builds the lookup tables.
    ///
    /// # Errors
    /// - If a task is malformed, duplicated or uses a category without a limit.
    /// - If a dependency is unknown, points at its own task or forms a cycle.
    pub fn new(
        mut tasks: Vec<Task>,
        limits: BTreeMap<Category, f64>,
    ) -> Result<Self, InstanceError> {
        if let Some((&category, &capacity)) = limits
            .iter()
            .find(|(_, capacity)| !capacity.is_finite() || **capacity < 0.0)
        {
            return Err(InstanceError::InvalidCapacity(category, capacity));
        }

        tasks.sort_by(|a, b| a.id.cmp(&b.id));

        let mut index = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            validate_task(task, &limits)?;
            if index.insert(task.id.clone(), i).is_some() {
                return Err(InstanceError::DuplicateTask(task.id.clone()));
            }
        }

        let release = tasks.iter().map(|task| task.earliest_start).max().unwrap_or_default();
        let serial = tasks.iter().try_fold(release, |total, task| total.checked_add(task.duration));
        if !matches!(serial, Some(total) if total <= MAX_TIME) {
            return Err(InstanceError::HorizonOverflow);
        }

        let mut dependencies = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let mut resolved = Vec::with_capacity(task.dependencies.len());
            for dependency in &task.dependencies {
                if *dependency == task.id {
                    return Err(InstanceError::SelfDependency(task.id.clone()));
                }
                let Some(&i) = index.get(dependency) else {
                    return Err(InstanceError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dependency.clone(),
                    });
                };
                resolved.push(i);
            }
            resolved.sort_unstable();
            resolved.dedup();
            dependencies.push(resolved);
        }

        let topological = topological_order(&dependencies).map_err(|cycle| {
            InstanceError::DependencyCycle(cycle.into_iter().map(|i| tasks[i].id.clone()).collect())
        })?;

        let mut lanes: BTreeMap<Category, Vec<usize>> = BTreeMap::new();
        for (i, task) in tasks.iter().enumerate() {
            lanes.entry(task.category).or_default().push(i);
        }

        Ok(Self {
            tasks,
            limits,
            index,
            dependencies,
            lanes,
            topological,
        })
    }

    /// Creates an instance without tasks.
    #[must_use]
    pub fn empty(limits: BTreeMap<Category, f64>) -> Self {
        Self {
            tasks: Vec::new(),
            limits,
            index: HashMap::new(),
            dependencies: Vec::new(),
            lanes: BTreeMap::new(),
            topological: Vec::new(),
        }
    }

    /// Returns the tasks in canonical order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Returns the resource limits.
    #[must_use]
    pub const fn limits(&self) -> &BTreeMap<Category, f64> {
        &self.limits
    }

    /// Returns the capacity of the category of the given task.
    #[must_use]
    pub fn capacity_of(&self, task: usize) -> f64 {
        self.capacity(self.tasks[task].category)
    }

    /// Returns the capacity of a category. Categories without a limit have none.
    #[must_use]
    pub fn capacity(&self, category: Category) -> f64 {
        self.limits.get(&category).copied().unwrap_or_default()
    }

    /// Returns the index of the task with the given id.
    #[must_use]
    pub fn position(&self, id: &TaskId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Returns the indices of the dependencies of a task.
    #[must_use]
    pub fn dependencies(&self, task: usize) -> &[usize] {
        &self.dependencies[task]
    }

    /// Returns the task indices of every category that has tasks, in canonical order.
    #[must_use]
    pub const fn lanes(&self) -> &BTreeMap<Category, Vec<usize>> {
        &self.lanes
    }

    /// Returns the task indices in an order where dependencies come first.
    #[must_use]
    pub fn topological(&self) -> &[usize] {
        &self.topological
    }

    /// Returns the time bound for the given policy. Zero for an empty instance.
    #[must_use]
    pub fn horizon(&self, policy: Horizon) -> u64 {
        match policy {
            Horizon::Release => self
                .tasks
                .iter()
                .map(|task| task.earliest_start + task.duration)
                .max()
                .unwrap_or_default(),
            Horizon::Serial => {
                let release = self.tasks.iter().map(|task| task.earliest_start).max();
                let total: u64 = self.tasks.iter().map(|task| task.duration).sum();
                release.map_or(0, |release| release + total)
            }
        }
    }

    /// Returns the tasks whose demand alone exceeds their category's capacity.
    #[must_use]
    pub fn oversized(&self) -> Vec<usize> {
        (0..self.tasks.len())
            .filter(|&task| self.tasks[task].demand > self.capacity_of(task) + super::EPSILON)
            .collect()
    }
}

impl TryFrom<RawInstance> for Instance {
    type Error = InstanceError;

    fn try_from(raw: RawInstance) -> Result<Self, Self::Error> {
        Self::new(raw.tasks, raw.limits)
    }
}

impl From<Instance> for RawInstance {
    fn from(instance: Instance) -> Self {
        Self {
            tasks: instance.tasks,
            limits: instance.limits,
        }
    }
}

fn validate_task(task: &Task, limits: &BTreeMap<Category, f64>) -> Result<(), InstanceError> {
    if task.duration == 0 {
        return Err(InstanceError::InvalidDuration(task.id.clone()));
    }
    if !task.priority.is_finite() || task.priority <= 0.0 {
        return Err(InstanceError::InvalidPriority(task.id.clone(), task.priority));
    }
    if !task.demand.is_finite() || task.demand < 0.0 {
        return Err(InstanceError::InvalidDemand(task.id.clone(), task.demand));
    }
    if !limits.contains_key(&task.category) {
        return Err(InstanceError::MissingCategory {
            task: task.id.clone(),
            category: task.category,
        });
    }
    Ok(())
}

/// Kahn's algorithm. Returns the tasks left on a cycle on failure.
fn topological_order(dependencies: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let mut dependents = vec![Vec::new(); dependencies.len()];
    let mut waiting: Vec<_> = dependencies.iter().map(Vec::len).collect();

    for (task, deps) in dependencies.iter().enumerate() {
        for &dependency in deps {
            dependents[dependency].push(task);
        }
    }

    let mut ready: VecDeque<_> = (0..dependencies.len()).filter(|&i| waiting[i] == 0).collect();
    let mut order = Vec::with_capacity(dependencies.len());

    while let Some(task) = ready.pop_front() {
        order.push(task);
        for &dependent in &dependents[task] {
            waiting[dependent] -= 1;
            if waiting[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }

    if order.len() == dependencies.len() {
        Ok(order)
    } else {
        Err((0..dependencies.len()).filter(|&i| waiting[i] > 0).collect())
    }
}
