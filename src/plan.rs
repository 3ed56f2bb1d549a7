//! Two-phase build planning.
//!
//! Phase one, [`build_plan`], is a pure function from a declarative
//! multi-project build description to a task graph plus the payloads of
//! every coverage task. Phase two, [`classpath_augmentation`], runs once the
//! concrete set of tasks selected for this invocation is known and decides
//! which test tasks get instrumented output on their classpath.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::aggregate::AggregateTask;
use crate::check::{check_coverage, DecimalParser};
use crate::compile::instrumentation_args;
use crate::config::{CheckConfig, CoverageSettings};
use crate::error::Result;
use crate::graph::{DependencyCache, TaskGraph, TaskId, TaskKind, TraversalMode};
use crate::report::ReportTask;
use crate::runtime::ExecutionContext;

pub const COMPILE_NAME: &str = "compile";
pub const PACKAGE_NAME: &str = "jar";
pub const INSTRUMENTED_COMPILE_NAME: &str = "compileScoverage";
pub const REPORT_NAME: &str = "reportScoverage";
pub const CHECK_NAME: &str = "checkScoverage";
pub const AGGREGATE_NAME: &str = "aggregateScoverage";

/// One project within the build.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectDescription {
    pub name: String,
    /// Name of the parent project, if any.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub settings: CoverageSettings,
    /// Names of the project's test-execution tasks.
    #[serde(default)]
    pub test_tasks: Vec<String>,
    /// Projects whose compile output this project's compilation depends on.
    #[serde(default)]
    pub project_dependencies: Vec<String>,
    /// Whether the project has a compatible compilation setup at all.
    #[serde(default = "default_true")]
    pub compiles: bool,
    /// Whether instrumentation is applied to this project.
    #[serde(default = "default_true")]
    pub instrumented: bool,
    /// Source root directories.
    #[serde(default)]
    pub sources: Vec<PathBuf>,
    #[serde(default = "default_encoding")]
    pub source_encoding: String,
    /// Output directory of the instrumented compilation.
    #[serde(default = "default_instrumented_classes")]
    pub instrumented_classes: PathBuf,
    /// Artifacts of the coverage-runner dependency configuration.
    #[serde(default)]
    pub runtime_classpath: Vec<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_encoding() -> String {
    "UTF-8".to_string()
}

fn default_instrumented_classes() -> PathBuf {
    PathBuf::from("build/classes/scoverage")
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildDescription {
    pub projects: Vec<ProjectDescription>,
}

impl BuildDescription {
    fn project(&self, name: &str) -> Option<&ProjectDescription> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// All projects below `name` in the project tree, not just direct
    /// children. Aggregation at parent scope spans the whole subtree.
    fn descendants(&self, name: &str) -> Vec<&ProjectDescription> {
        let mut out: Vec<&ProjectDescription> = Vec::new();
        let mut stack: Vec<&str> = vec![name];
        while let Some(current) = stack.pop() {
            for child in self
                .projects
                .iter()
                .filter(|p| p.parent.as_deref() == Some(current))
            {
                out.push(child);
                stack.push(child.name.as_str());
            }
        }
        out
    }
}

/// A check task's payload: where to read the aggregated report and which
/// thresholds to enforce.
#[derive(Debug, Clone)]
pub struct CheckSpec {
    pub report_dir: PathBuf,
    pub checks: Vec<CheckConfig>,
}

impl CheckSpec {
    /// Run every configured threshold check. Returns `false` (a skip, not a
    /// failure) when the report directory ended up absent or empty.
    pub fn execute(&self, parser: &DecimalParser) -> Result<bool> {
        if !dir_has_entries(&self.report_dir)? {
            info!(report_dir = %self.report_dir.display(), "report directory is empty, skipping coverage check");
            return Ok(false);
        }
        for check in &self.checks {
            check_coverage(
                &self.report_dir,
                check.coverage_type,
                check.minimum_rate,
                parser,
            )?;
        }
        Ok(true)
    }
}

fn dir_has_entries(dir: &Path) -> Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    Ok(std::fs::read_dir(dir)?.next().is_some())
}

/// The resolved plan: the task graph plus every coverage task's payload,
/// keyed by task id.
#[derive(Debug, Default)]
pub struct BuildPlan {
    pub graph: TaskGraph,
    pub report_tasks: BTreeMap<TaskId, ReportTask>,
    pub aggregate_tasks: BTreeMap<TaskId, AggregateTask>,
    pub check_tasks: BTreeMap<TaskId, CheckSpec>,
    /// Instrumentation flags per instrumented compile task. The plugin
    /// activation flag is appended separately at execution time.
    pub compile_args: BTreeMap<TaskId, Vec<String>>,
}

/// Deterministic per-test report task name, `report<Test>Scoverage`.
fn report_task_name(test_task: &str) -> String {
    let mut chars = test_task.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    };
    format!("report{}Scoverage", capitalized)
}

/// Report directory for a single test run, a sibling of the project report
/// directory suffixed with the capitalized test task name.
fn per_test_report_dir(settings: &CoverageSettings, test_task: &str) -> PathBuf {
    let mut chars = test_task.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    };
    let base = settings
        .report_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("scoverage");
    let name = format!("{}{}", base, capitalized);
    match settings.report_dir.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Phase one: derive the full coverage task graph from the build
/// description. Pure with respect to the filesystem; execution-time gating
/// (measurement presence, report emptiness) stays in the task payloads.
pub fn build_plan(build: &BuildDescription) -> Result<BuildPlan> {
    let mut plan = BuildPlan::default();

    // Fail configuration errors before any task exists.
    for project in &build.projects {
        if project.instrumented {
            project.settings.resolved_checks()?;
            project.settings.validate_patterns()?;
        }
    }

    for project in build.projects.iter().filter(|p| p.compiles) {
        wire_project(&mut plan, project)?;
    }

    // Cross-project compile edges mirror declared project dependencies. The
    // instrumented compile shares all inputs with the original one, so it
    // carries the same edges.
    for project in build.projects.iter().filter(|p| p.compiles) {
        let compile = TaskId::new(&project.name, COMPILE_NAME);
        let instrumented = TaskId::new(&project.name, INSTRUMENTED_COMPILE_NAME);
        for dep in &project.project_dependencies {
            if build.project(dep).is_some_and(|p| p.compiles) {
                let dep_compile = TaskId::new(dep, COMPILE_NAME);
                plan.graph.add_dependency(&compile, dep_compile.clone());
                if plan.graph.contains(&instrumented) {
                    plan.graph.add_dependency(&instrumented, dep_compile);
                }
            }
        }
    }

    // Re-wiring passes need the whole graph, so they run after every
    // project's tasks exist.
    let cache = DependencyCache::new();
    for project in build
        .projects
        .iter()
        .filter(|p| p.compiles && p.instrumented && p.settings.instrumented_only)
    {
        rewire_instrumented_only(&mut plan, project, &cache);
    }

    for project in &build.projects {
        wire_parent_aggregation(&mut plan, build, project);
    }

    Ok(plan)
}

/// Tasks and payloads for one instrumented project.
fn wire_project(plan: &mut BuildPlan, project: &ProjectDescription) -> Result<()> {
    let graph = &mut plan.graph;
    let compile = TaskId::new(&project.name, COMPILE_NAME);
    let package = TaskId::new(&project.name, PACKAGE_NAME);

    graph.add_task(compile.clone(), TaskKind::Compile);
    graph.add_task(package.clone(), TaskKind::Package);
    graph.add_dependency(&package, compile.clone());

    for test in &project.test_tasks {
        graph.add_task(TaskId::new(&project.name, test), TaskKind::Test);
    }

    if !project.instrumented {
        return Ok(());
    }

    let settings = &project.settings;
    let instrumented = TaskId::new(&project.name, INSTRUMENTED_COMPILE_NAME);

    // Shares all inputs with the original compile but writes elsewhere;
    // ordered after it to avoid output directory races.
    graph.add_task(instrumented.clone(), TaskKind::InstrumentedCompile);
    graph.add_ordering(&instrumented, compile.clone());
    plan.compile_args
        .insert(instrumented.clone(), instrumentation_args(settings));

    let report = TaskId::new(&project.name, REPORT_NAME);
    graph.add_task(report.clone(), TaskKind::Aggregate);

    let mut data_dirs = Vec::new();
    for test in &project.test_tasks {
        let test_id = TaskId::new(&project.name, test);
        graph.add_ordering(&test_id, instrumented.clone());

        let per_test = TaskId::new(&project.name, report_task_name(test));
        graph.add_task(per_test.clone(), TaskKind::Report);
        graph.add_dependency(&per_test, package.clone());
        graph.add_dependency(&per_test, instrumented.clone());
        graph.add_dependency(&per_test, test_id);
        graph.add_dependency(&report, per_test.clone());

        plan.report_tasks.insert(
            per_test,
            ReportTask {
                data_dir: settings.data_dir.clone(),
                report_dir: per_test_report_dir(settings, test),
                sources: project.sources.clone(),
                source_encoding: project.source_encoding.clone(),
                outputs: settings.outputs,
            },
        );
        // Every test run appends into the project data dir; duplicates
        // collapse during aggregation.
        data_dirs.push(settings.data_dir.clone());
    }

    plan.aggregate_tasks.insert(
        report.clone(),
        AggregateTask {
            report_dir: settings.report_dir.clone(),
            dirs_to_aggregate_from: data_dirs,
            sources: project.sources.clone(),
            source_encoding: project.source_encoding.clone(),
            outputs: settings.outputs,
            delete_reports_on_aggregation: false,
        },
    );

    let check = TaskId::new(&project.name, CHECK_NAME);
    graph.add_task(check.clone(), TaskKind::Check);
    graph.add_dependency(&check, report);
    plan.check_tasks.insert(
        check,
        CheckSpec {
            report_dir: settings.report_dir.clone(),
            checks: settings.resolved_checks()?,
        },
    );

    Ok(())
}

/// Mode B: the instrumented compile becomes the sole compile task.
fn rewire_instrumented_only(
    plan: &mut BuildPlan,
    project: &ProjectDescription,
    cache: &DependencyCache,
) {
    info!(project = %project.name, "making instrumented compilation the primary compilation task");

    let compile = TaskId::new(&project.name, COMPILE_NAME);
    let instrumented = TaskId::new(&project.name, INSTRUMENTED_COMPILE_NAME);

    plan.graph.set_enabled(&compile, false);

    // Rewire every same-project task that transitively depended on the
    // original compile output.
    let dependents: Vec<TaskId> = plan
        .graph
        .project_tasks(&project.name)
        .filter(|(id, _)| {
            **id != compile
                && **id != instrumented
                && cache
                    .transitive_dependencies(&plan.graph, id, TraversalMode::SameProjectOnly)
                    .contains(&compile)
        })
        .map(|(id, _)| id.clone())
        .collect();
    for id in dependents {
        debug!(task = %id, "rewiring onto instrumented compile");
        plan.graph.add_dependency(&id, instrumented.clone());
    }

    // Instrumented artifacts must be available project-by-project: depend on
    // the instrumented compile of any project this compilation transitively
    // depends on, and keep our tests from contaminating their reports.
    let compile_deps: Vec<TaskId> = cache
        .transitive_dependencies(&plan.graph, &instrumented, TraversalMode::CrossProject)
        .iter()
        .filter(|dep| {
            dep.project != project.name
                && plan
                    .graph
                    .task(dep)
                    .is_some_and(|n| n.kind == TaskKind::Compile)
        })
        .cloned()
        .collect();

    for dep in compile_deps {
        let dep_instrumented = TaskId::new(&dep.project, INSTRUMENTED_COMPILE_NAME);
        if !plan.graph.contains(&dep_instrumented) {
            continue;
        }
        plan.graph
            .add_dependency(&instrumented, dep_instrumented);

        let dep_report = TaskId::new(&dep.project, REPORT_NAME);
        for test in &project.test_tasks {
            plan.graph
                .add_ordering(&TaskId::new(&project.name, test), dep_report.clone());
        }
    }
}

/// One more aggregation at parent scope, representing the whole subtree.
fn wire_parent_aggregation(
    plan: &mut BuildPlan,
    build: &BuildDescription,
    project: &ProjectDescription,
) {
    let descendants = build.descendants(&project.name);
    if descendants.is_empty() || !project.instrumented {
        return;
    }

    let mut child_reports = Vec::new();
    for child in &descendants {
        if child.compiles && !child.instrumented {
            warn!(
                project = %child.name,
                "sub-project doesn't have coverage applied and will be ignored in parent project aggregation"
            );
            continue;
        }
        let report = TaskId::new(&child.name, REPORT_NAME);
        if plan.graph.contains(&report) {
            child_reports.push((report, *child));
        }
    }

    let parent_report = TaskId::new(&project.name, REPORT_NAME);
    let aggregate = TaskId::new(&project.name, AGGREGATE_NAME);
    plan.graph.add_task(aggregate.clone(), TaskKind::Aggregate);

    // Union sources and measurement dirs across the tree.
    let mut sources = project.sources.clone();
    let mut data_dirs: Vec<PathBuf> = plan
        .aggregate_tasks
        .get(&parent_report)
        .map(|t| t.dirs_to_aggregate_from.clone())
        .unwrap_or_default();
    for (report, child) in &child_reports {
        sources.extend(child.sources.iter().cloned());
        if let Some(task) = plan.aggregate_tasks.get(report) {
            data_dirs.extend(task.dirs_to_aggregate_from.iter().cloned());
        }
    }

    // A non-compiling parent has no report task of its own.
    if plan.graph.contains(&parent_report) {
        plan.graph.add_dependency(&aggregate, parent_report);
    }
    for (report, _) in &child_reports {
        plan.graph.add_dependency(&aggregate, report.clone());
    }
    // Without any instrumented child there is nothing beyond the parent's
    // own report task.
    if child_reports.is_empty() {
        plan.graph.set_enabled(&aggregate, false);
    }

    plan.aggregate_tasks.insert(
        aggregate.clone(),
        AggregateTask {
            report_dir: project.settings.report_dir.clone(),
            dirs_to_aggregate_from: data_dirs,
            sources,
            source_encoding: project.source_encoding.clone(),
            outputs: project.settings.outputs,
            delete_reports_on_aggregation: project.settings.delete_reports_on_aggregation,
        },
    );

    plan.graph
        .add_ordering(&TaskId::new(&project.name, CHECK_NAME), aggregate);
}

/// Classpath entries to prepend to one test task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Augmentation {
    pub test_task: TaskId,
    pub entries: Vec<PathBuf>,
}

/// Phase two, run when the execution graph is ready: decide classpath
/// augmentation from the tasks actually selected for this invocation. Test
/// tasks only see instrumented output when some report task of their project
/// was requested at all.
pub fn classpath_augmentation(
    build: &BuildDescription,
    plan: &BuildPlan,
    selected: &BTreeSet<TaskId>,
) -> Vec<Augmentation> {
    let mut augmentations = Vec::new();

    for project in build.projects.iter().filter(|p| p.instrumented) {
        let any_report_selected = plan
            .graph
            .project_tasks(&project.name)
            .filter(|(_, node)| matches!(node.kind, TaskKind::Report | TaskKind::Aggregate))
            .any(|(id, _)| selected.contains(id));
        if !any_report_selected {
            continue;
        }

        for test in &project.test_tasks {
            let test_id = TaskId::new(&project.name, test);
            info!(task = %test_id, "adding instrumented classes to test classpath");

            let mut context = ExecutionContext::new();
            context.extend(project.runtime_classpath.iter().cloned());
            context.extend([project.instrumented_classes.clone()]);
            augmentations.push(Augmentation {
                test_task: test_id,
                entries: context.entries().to_vec(),
            });
        }
    }

    augmentations
}
