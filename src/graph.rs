//! The declarative task graph and memoized transitive-dependency lookup.
//!
//! The graph only records ordering and dependency edges; an external
//! scheduler consumes them and may run independent tasks in parallel. Once
//! configured, the graph does not change mid-build, so transitive lookups
//! are memoized per `(task, traversal mode)`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A task within a (possibly multi-project) build, addressed as
/// `project:name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    pub project: String,
    pub name: String,
}

impl TaskId {
    pub fn new(project: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.project, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Compile,
    InstrumentedCompile,
    Package,
    Test,
    Report,
    Aggregate,
    Check,
}

#[derive(Debug, Clone)]
pub struct TaskNode {
    pub kind: TaskKind,
    /// Data dependencies: these tasks must run, and run first.
    pub depends_on: BTreeSet<TaskId>,
    /// Ordering constraints only: no execution is forced.
    pub must_run_after: BTreeSet<TaskId>,
    pub enabled: bool,
}

/// A declarative task/dependency graph. Must be acyclic; the resolver only
/// ever adds edges that follow the build's data flow.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: BTreeMap<TaskId, TaskNode>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, id: TaskId, kind: TaskKind) {
        self.tasks.entry(id).or_insert(TaskNode {
            kind,
            depends_on: BTreeSet::new(),
            must_run_after: BTreeSet::new(),
            enabled: true,
        });
    }

    pub fn add_dependency(&mut self, from: &TaskId, to: TaskId) {
        if let Some(node) = self.tasks.get_mut(from) {
            node.depends_on.insert(to);
        }
    }

    pub fn add_ordering(&mut self, from: &TaskId, after: TaskId) {
        if let Some(node) = self.tasks.get_mut(from) {
            node.must_run_after.insert(after);
        }
    }

    pub fn set_enabled(&mut self, id: &TaskId, enabled: bool) {
        if let Some(node) = self.tasks.get_mut(id) {
            node.enabled = enabled;
        }
    }

    pub fn task(&self, id: &TaskId) -> Option<&TaskNode> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = (&TaskId, &TaskNode)> {
        self.tasks.iter()
    }

    pub fn project_tasks<'a>(
        &'a self,
        project: &'a str,
    ) -> impl Iterator<Item = (&'a TaskId, &'a TaskNode)> + 'a {
        self.tasks.iter().filter(move |(id, _)| id.project == project)
    }
}

/// Filter applied while walking dependency edges. The two modes must not
/// share results: a same-project walk stopping at a project boundary is not
/// a prefix of the cross-project walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraversalMode {
    SameProjectOnly,
    CrossProject,
}

/// Memoized transitive-dependency lookup, keyed by `(task, mode)`.
///
/// Results are immutable once computed: tasks are not re-wired after the
/// graph is configured. The cache may be populated from multiple tasks being
/// configured in parallel; each entry is computed at most once per holder of
/// the table lock and reused thereafter.
#[derive(Debug, Default)]
pub struct DependencyCache {
    memo: Mutex<HashMap<(TaskId, TraversalMode), Arc<BTreeSet<TaskId>>>>,
    computations: AtomicUsize,
}

impl DependencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// All tasks `task` depends on, transitively, following `depends_on`
    /// edges and honoring the traversal filter.
    pub fn transitive_dependencies(
        &self,
        graph: &TaskGraph,
        task: &TaskId,
        mode: TraversalMode,
    ) -> Arc<BTreeSet<TaskId>> {
        let key = (task.clone(), mode);
        if let Some(cached) = self.memo.lock().unwrap().get(&key) {
            return Arc::clone(cached);
        }

        self.computations.fetch_add(1, Ordering::Relaxed);

        let direct: Vec<TaskId> = match graph.task(task) {
            Some(node) => node
                .depends_on
                .iter()
                .filter(|dep| mode == TraversalMode::CrossProject || dep.project == task.project)
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        let mut result: BTreeSet<TaskId> = BTreeSet::new();
        for dep in direct {
            let nested = self.transitive_dependencies(graph, &dep, mode);
            result.extend(nested.iter().cloned());
            result.insert(dep);
        }

        let result = Arc::new(result);
        self.memo
            .lock()
            .unwrap()
            .insert(key, Arc::clone(&result));
        result
    }

    /// Number of distinct entries actually computed (as opposed to served
    /// from the memo table).
    pub fn computation_count(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> TaskId {
        TaskId::new("root", name)
    }

    /// A → B, A → C, B → D, C → D.
    fn diamond() -> TaskGraph {
        let mut graph = TaskGraph::new();
        for name in ["a", "b", "c", "d"] {
            graph.add_task(id(name), TaskKind::Compile);
        }
        graph.add_dependency(&id("a"), id("b"));
        graph.add_dependency(&id("a"), id("c"));
        graph.add_dependency(&id("b"), id("d"));
        graph.add_dependency(&id("c"), id("d"));
        graph
    }

    #[test]
    fn test_diamond_transitive_dependencies() {
        let graph = diamond();
        let cache = DependencyCache::new();
        let deps = cache.transitive_dependencies(&graph, &id("a"), TraversalMode::CrossProject);
        let expected: BTreeSet<TaskId> = [id("b"), id("c"), id("d")].into_iter().collect();
        assert_eq!(*deps, expected);
    }

    #[test]
    fn test_repeated_queries_hit_cache() {
        let graph = diamond();
        let cache = DependencyCache::new();
        for _ in 0..5 {
            let deps =
                cache.transitive_dependencies(&graph, &id("a"), TraversalMode::CrossProject);
            assert_eq!(deps.len(), 3);
        }
        // a, b, c, d each computed exactly once; 5 queries add nothing.
        assert_eq!(cache.computation_count(), 4);
    }

    #[test]
    fn test_same_project_filter() {
        let mut graph = diamond();
        let other = TaskId::new("lib", "compile");
        graph.add_task(other.clone(), TaskKind::Compile);
        graph.add_dependency(&id("b"), other.clone());

        let cache = DependencyCache::new();
        let same = cache.transitive_dependencies(&graph, &id("a"), TraversalMode::SameProjectOnly);
        assert!(!same.contains(&other));

        let cross = cache.transitive_dependencies(&graph, &id("a"), TraversalMode::CrossProject);
        assert!(cross.contains(&other));
    }

    #[test]
    fn test_modes_do_not_share_cache_entries() {
        let mut graph = TaskGraph::new();
        let a = id("a");
        let foreign = TaskId::new("lib", "compile");
        graph.add_task(a.clone(), TaskKind::Compile);
        graph.add_task(foreign.clone(), TaskKind::Compile);
        graph.add_dependency(&a, foreign.clone());

        let cache = DependencyCache::new();
        let same = cache.transitive_dependencies(&graph, &a, TraversalMode::SameProjectOnly);
        assert!(same.is_empty());
        let cross = cache.transitive_dependencies(&graph, &a, TraversalMode::CrossProject);
        assert_eq!(cross.len(), 1);
    }

    #[test]
    fn test_leaf_task_has_no_dependencies() {
        let graph = diamond();
        let cache = DependencyCache::new();
        let deps = cache.transitive_dependencies(&graph, &id("d"), TraversalMode::CrossProject);
        assert!(deps.is_empty());
    }

    #[test]
    fn test_ordering_edges_are_not_dependencies() {
        let mut graph = TaskGraph::new();
        graph.add_task(id("a"), TaskKind::Compile);
        graph.add_task(id("b"), TaskKind::Compile);
        graph.add_ordering(&id("a"), id("b"));

        let cache = DependencyCache::new();
        let deps = cache.transitive_dependencies(&graph, &id("a"), TraversalMode::CrossProject);
        assert!(deps.is_empty());
    }
}
