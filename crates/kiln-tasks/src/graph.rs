//! Task graph construction and ordering

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, instrument};

use kiln_core::TaskConfig;

use crate::task::{Task, TaskId};

/// Named tasks and the dependency edges between them
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    /// Tasks in declaration order
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and validate a graph from configured tasks
    #[instrument(skip_all, fields(tasks = configs.len()))]
    pub fn from_config(configs: &[TaskConfig]) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for config in configs {
            graph.add_task(Task::from_config(config))?;
        }
        graph.validate()?;
        info!(tasks = graph.len(), "task graph built");
        Ok(graph)
    }

    /// Add a task; names must be unique
    pub fn add_task(&mut self, mut task: Task) -> Result<(), GraphError> {
        if self.index.contains_key(&task.id) {
            return Err(GraphError::DuplicateTask(task.id.to_string()));
        }
        task.dedup_dependencies();
        self.index.insert(task.id.clone(), self.tasks.len());
        self.tasks.push(task);
        Ok(())
    }

    /// Builder-style [`add_task`](Self::add_task)
    pub fn with_task(mut self, task: Task) -> Result<Self, GraphError> {
        self.add_task(task)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.index.get(name).map(|&i| &self.tasks[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All tasks in declaration order
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks that directly depend on `name`, in declaration order
    pub fn dependents(&self, name: &str) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.depends_on.iter().any(|d| d.as_str() == name))
            .collect()
    }

    /// Check that every dependency resolves and the graph is acyclic
    pub fn validate(&self) -> Result<(), GraphError> {
        let all: Vec<&str> = self.tasks.iter().map(Task::name).collect();
        self.resolve_indices(all.as_slice()).map(|_| ())
    }

    /// Tasks required by `targets`, each after all of its dependencies.
    ///
    /// Ties are broken by declaration order.
    #[instrument(skip(self, targets), fields(targets = targets.len()))]
    pub fn resolve_order<S: AsRef<str>>(&self, targets: &[S]) -> Result<Vec<TaskId>, GraphError> {
        Ok(self
            .resolve_indices(targets)?
            .into_iter()
            .map(|i| self.tasks[i].id.clone())
            .collect())
    }

    /// The resolved closure grouped into waves that could run in parallel
    pub fn waves<S: AsRef<str>>(&self, targets: &[S]) -> Result<Vec<Vec<TaskId>>, GraphError> {
        let order = self.resolve_indices(targets)?;
        let mut wave_of: HashMap<usize, usize> = HashMap::new();
        let mut waves: Vec<Vec<TaskId>> = Vec::new();

        for idx in order {
            let wave = self.tasks[idx]
                .depends_on
                .iter()
                .filter_map(|dep| self.index.get(dep))
                .filter_map(|dep| wave_of.get(dep))
                .max()
                .map(|w| w + 1)
                .unwrap_or(0);
            wave_of.insert(idx, wave);
            if waves.len() <= wave {
                waves.resize_with(wave + 1, Vec::new);
            }
            waves[wave].push(self.tasks[idx].id.clone());
        }

        Ok(waves)
    }

    /// Get a human-readable summary of the execution plan
    pub fn execution_plan<S: AsRef<str>>(&self, targets: &[S]) -> Result<String, GraphError> {
        let mut plan = String::new();
        for (i, wave) in self.waves(targets)?.iter().enumerate() {
            plan.push_str(&format!("Wave {} ({} tasks):\n", i, wave.len()));
            for id in wave {
                let Some(task) = self.get(id.as_str()) else {
                    continue;
                };
                let action = task.action.describe();
                if task.depends_on.is_empty() {
                    plan.push_str(&format!("  {} -> {}\n", id, action));
                } else {
                    let deps: Vec<&str> = task.depends_on.iter().map(TaskId::as_str).collect();
                    plan.push_str(&format!(
                        "  {} -> {} (after: {})\n",
                        id,
                        action,
                        deps.join(", ")
                    ));
                }
            }
        }
        Ok(plan)
    }

    /// Closure of `targets` as declaration indices in execution order
    pub(crate) fn resolve_indices<S: AsRef<str>>(
        &self,
        targets: &[S],
    ) -> Result<Vec<usize>, GraphError> {
        let required = self.closure(targets)?;
        if let Some(cycle) = self.find_cycle(&required) {
            return Err(GraphError::CycleDetected(cycle));
        }
        let order = self.topological_order(&required);
        debug!(required = order.len(), "resolved task order");
        Ok(order)
    }

    pub(crate) fn index_of(&self, id: &TaskId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn task_at(&self, idx: usize) -> &Task {
        &self.tasks[idx]
    }

    fn closure<S: AsRef<str>>(&self, targets: &[S]) -> Result<BTreeSet<usize>, GraphError> {
        let mut stack = Vec::new();
        for target in targets {
            let name = target.as_ref();
            let idx = self
                .index
                .get(name)
                .copied()
                .ok_or_else(|| GraphError::UnknownTask {
                    name: name.to_string(),
                    required_by: None,
                })?;
            stack.push(idx);
        }

        let mut required = BTreeSet::new();
        while let Some(idx) = stack.pop() {
            if !required.insert(idx) {
                continue;
            }
            let task = &self.tasks[idx];
            for dep in &task.depends_on {
                let dep_idx = self
                    .index
                    .get(dep)
                    .copied()
                    .ok_or_else(|| GraphError::UnknownTask {
                        name: dep.to_string(),
                        required_by: Some(task.id.to_string()),
                    })?;
                if !required.contains(&dep_idx) {
                    stack.push(dep_idx);
                }
            }
        }
        Ok(required)
    }

    /// Depth-first search; the returned path starts and ends on the same task
    fn find_cycle(&self, required: &BTreeSet<usize>) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        let mut marks = vec![Mark::New; self.tasks.len()];
        for &start in required {
            if marks[start] != Mark::New {
                continue;
            }
            marks[start] = Mark::Active;
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

            while let Some(frame) = stack.last_mut() {
                let (node, next) = *frame;
                let deps = &self.tasks[node].depends_on;
                if next >= deps.len() {
                    marks[node] = Mark::Done;
                    stack.pop();
                    continue;
                }
                frame.1 += 1;

                let Some(&dep) = self.index.get(&deps[next]) else {
                    continue;
                };
                match marks[dep] {
                    Mark::New => {
                        marks[dep] = Mark::Active;
                        stack.push((dep, 0));
                    }
                    Mark::Active => {
                        let from = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                        let mut cycle: Vec<String> = stack[from..]
                            .iter()
                            .map(|&(n, _)| self.tasks[n].id.to_string())
                            .collect();
                        cycle.push(self.tasks[dep].id.to_string());
                        return Some(cycle);
                    }
                    Mark::Done => {}
                }
            }
        }
        None
    }

    /// Kahn's algorithm over the required subgraph
    fn topological_order(&self, required: &BTreeSet<usize>) -> Vec<usize> {
        let mut in_degree: HashMap<usize, usize> = HashMap::new();
        let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();

        for &idx in required {
            let deps: Vec<usize> = self.tasks[idx]
                .depends_on
                .iter()
                .filter_map(|d| self.index.get(d).copied())
                .collect();
            in_degree.insert(idx, deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(idx);
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&idx, _)| idx)
            .collect();
        let mut order = Vec::with_capacity(required.len());

        while let Some(idx) = ready.pop_first() {
            order.push(idx);
            for dependent in dependents.get(&idx).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        order
    }
}

/// Configuration errors in the task graph
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Two tasks share a name
    #[error("Duplicate task '{0}'")]
    DuplicateTask(String),

    /// A target or dependency names no declared task
    #[error("{}", unknown_task_message(.name, .required_by.as_deref()))]
    UnknownTask {
        name: String,
        required_by: Option<String>,
    },

    /// The dependency path, first and last entries being the same task
    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),
}

fn unknown_task_message(name: &str, required_by: Option<&str>) -> String {
    match required_by {
        Some(by) => format!("Unknown task '{}' (required by '{}')", name, by),
        None => format!("Unknown task '{}'", name),
    }
}
