//! CLI command implementations.

use colored::Colorize;
use grove_core::{ClassFact, DeletedFact, GraphNode, IdentityKey};
use grove_graph::{
    CloneExclusions, GraphSync, ImportRequest, NodeFilter, RelationshipFilter, SyncConfig,
    TraversalOptions, CONFIG_DIR, CONFIG_FILE,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("No node {key} in {project}@{branch}")]
    NodeNotFound {
        project: String,
        branch: String,
        key: IdentityKey,
    },
}

/// Contents of a fact file: one partition's classes and removals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactBatch {
    pub project_id: String,
    pub branch: String,
    pub classes: Vec<ClassFact>,
    pub deleted: Vec<DeletedFact>,
}

impl FactBatch {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let mut batch: FactBatch = serde_json::from_str(&text)?;
        // Classes may leave the partition implicit.
        for class in &mut batch.classes {
            if class.project_id.is_empty() {
                class.project_id = batch.project_id.clone();
            }
            if class.branch.is_empty() {
                class.branch = batch.branch.clone();
            }
            if class.name.is_empty() {
                class.name = simple_name(&class.full_class_name).to_string();
            }
            for method in &mut class.methods {
                if method.name.is_empty() {
                    method.name = method.full_name.split('(').next().unwrap_or_default().to_string();
                }
            }
        }
        Ok(batch)
    }
}

fn simple_name(full_class_name: &str) -> &str {
    full_class_name.rsplit('.').next().unwrap_or(full_class_name)
}

/// Flags of `grove import`.
#[derive(Debug, Default)]
pub struct ImportOptions {
    pub simple: bool,
    pub main: Option<String>,
    pub base: Option<String>,
    pub pr: Option<String>,
    pub version: Option<String>,
    pub base_version: Option<String>,
    pub batch_size: Option<usize>,
}

fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Config from `.grove/config.json` if present, with environment overrides.
fn load_config(root: &Path) -> Result<SyncConfig> {
    let path = config_path(root);
    let config = if path.exists() {
        debug!("Loading config from {}", path.display());
        SyncConfig::load(&path)?
    } else {
        debug!("No config at {}, using defaults", path.display());
        SyncConfig::for_root(root)
    };
    Ok(config.apply_env()?)
}

fn open(root: &Path) -> Result<GraphSync> {
    Ok(GraphSync::open(load_config(root)?)?)
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message.to_string());
    Ok(spinner)
}

/// Initialize Grove in a directory.
pub fn init(root: &Path, main: Option<String>) -> Result<()> {
    let path = config_path(root);
    if path.exists() {
        println!("{} Already initialized", "✓".green());
        return Ok(());
    }

    let mut config = SyncConfig::for_root(root);
    config.main_branch = main;
    config.save(&path)?;

    println!("{} Initialized Grove in {}", "✓".green(), root.display());
    println!("  Run {} to load facts", "grove import <facts.json>".cyan());
    Ok(())
}

pub fn import(root: &Path, file: &Path, options: ImportOptions) -> Result<()> {
    let batch = FactBatch::load(file)?;
    info!(
        "Loaded {} classes and {} deletions from {}",
        batch.classes.len(),
        batch.deleted.len(),
        file.display()
    );
    let sync = open(root)?;

    let mut request = ImportRequest::new(&batch.project_id, &batch.branch, batch.classes)
        .with_deleted(batch.deleted);
    request.main_branch = options.main.or_else(|| sync.config().main_branch.clone());
    request.base_branch = options.base;
    request.pull_request_id = options.pr;
    request.version = options.version;
    request.base_version = options.base_version;
    request.batch_size = options.batch_size;

    let spinner = spinner(&format!(
        "Importing {} classes into {}@{}...",
        request.facts.len(),
        request.project_id,
        request.branch
    ))?;
    let report = if options.simple {
        sync.import_facts_simple(&request)
    } else {
        sync.import_facts(&request)
    };
    spinner.finish_and_clear();
    let report = report?;

    println!(
        "{} Imported {} classes ({} mode, {} batches)",
        "✓".green(),
        report.imported.to_string().cyan(),
        report.mode,
        report.batches
    );
    println!(
        "  {} {} created, {} deleted, {} unchanged, {} tombstones",
        "Nodes:".dimmed(),
        report.nodes_created,
        report.nodes_deleted,
        report.unchanged,
        report.tombstones
    );
    println!(
        "  {} {} created, {} of {} restored, {} duplicates removed",
        "Edges:".dimmed(),
        report.edges_created,
        report.edges_restored,
        report.edges_saved,
        report.duplicate_edges_removed
    );

    sync.close()?;
    Ok(())
}

pub fn clone(
    root: &Path,
    project: &str,
    source: &str,
    target: &str,
    exclude_facts: Option<&Path>,
    page_size: Option<usize>,
) -> Result<()> {
    let exclusions = match exclude_facts {
        Some(path) => CloneExclusions::from_facts(&FactBatch::load(path)?.classes),
        None => CloneExclusions::new(),
    };
    info!(
        "Cloning {}@{} into {} with {} exclusions",
        project,
        source,
        target,
        exclusions.len()
    );
    let sync = open(root)?;

    let spinner = spinner(&format!("Cloning {} into {}...", source, target))?;
    let report = sync.clone_branch(project, source, target, &exclusions, page_size);
    spinner.finish_and_clear();
    let report = report?;

    println!(
        "{} Cloned {} nodes and {} edges from {} into {}",
        "✓".green(),
        report.nodes_copied.to_string().cyan(),
        report.edges_copied().to_string().cyan(),
        source,
        target
    );
    if report.nodes_excluded > 0 {
        println!("  {} {}", "Excluded:".dimmed(), report.nodes_excluded);
    }
    if report.duplicate_nodes_removed > 0 {
        println!(
            "{} Removed {} duplicate nodes",
            "⚠".yellow(),
            report.duplicate_nodes_removed
        );
    }

    sync.close()?;
    Ok(())
}

pub fn delete_branch(root: &Path, project: &str, branch: &str, pr: Option<&str>) -> Result<()> {
    info!("Deleting {}@{} (pull request {:?})", project, branch, pr);
    let sync = open(root)?;
    let deleted = sync.delete_branch(project, branch, pr)?;
    match pr {
        Some(pr) => println!(
            "{} Deleted {} nodes of pull request {} from {}",
            "✓".green(),
            deleted,
            pr,
            branch
        ),
        None => println!("{} Deleted {} nodes from {}", "✓".green(), deleted, branch),
    }
    sync.close()?;
    Ok(())
}

pub fn nodes(
    root: &Path,
    project: &str,
    branch: &str,
    class: Option<String>,
    method: Option<String>,
    config_only: bool,
    json: bool,
) -> Result<()> {
    let sync = open(root)?;
    let found = if config_only {
        sync.configuration_nodes(project, branch)?
    } else {
        let mut filter = NodeFilter::new(project, branch);
        filter.class_name = class;
        filter.method_name = method;
        sync.find_nodes(&filter)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else if found.is_empty() {
        println!("No nodes found in {}@{}", project, branch);
    } else {
        println!("Found {} nodes:\n", found.len());
        for node in &found {
            print_node(node);
        }
    }
    sync.close()?;
    Ok(())
}

fn print_node(node: &GraphNode) {
    let status = match node.status() {
        grove_core::NodeStatus::Active => node.status().to_string().green(),
        grove_core::NodeStatus::Modified => node.status().to_string().yellow(),
        grove_core::NodeStatus::Deleted => node.status().to_string().red(),
    };
    println!(
        "  {} {} {} {}",
        node.record.label.to_string().yellow(),
        node.identity().to_string().cyan(),
        status,
        format!("({} {})", node.id, node.branch()).dimmed()
    );
}

#[allow(clippy::too_many_arguments)]
pub fn traverse(
    root: &Path,
    project: &str,
    branch: &str,
    class: &str,
    method: Option<String>,
    filter: &str,
    min_level: usize,
    max_level: usize,
    keep_shadowed: bool,
) -> Result<()> {
    let filter: RelationshipFilter = filter.parse()?;
    let key = match method {
        Some(method) => IdentityKey::method(class, method),
        None => IdentityKey::class(class),
    };
    let sync = open(root)?;

    let start = sync
        .nodes_by_keys(project, branch, &[key.clone()], None)?
        .into_iter()
        .find(|n| !n.record.is_tombstone())
        .ok_or_else(|| CommandError::NodeNotFound {
            project: project.to_string(),
            branch: branch.to_string(),
            key,
        })?;

    let mut options = TraversalOptions::default()
        .with_filter(filter)
        .with_min_level(min_level)
        .with_max_level(max_level);
    options.exclude_shadowed_overlay = !keep_shadowed;
    let result = sync.traverse(&start, &options)?;

    println!(
        "{} {} ({} nodes reached)\n",
        "From".dimmed(),
        start.identity().to_string().cyan(),
        result.visits().count()
    );
    for visit in result.visits() {
        let via = match visit.via {
            Some((kind, _)) => kind.to_string(),
            None => "start".to_string(),
        };
        let overlay = if visit.overlay { " overlay" } else { "" };
        println!(
            "  {}{} {} {}{}",
            "  ".repeat(visit.depth.saturating_sub(1)),
            via.yellow(),
            visit.node.identity().to_string().cyan(),
            format!("@{}", visit.node.branch()).dimmed(),
            overlay.dimmed()
        );
    }
    sync.close()?;
    Ok(())
}

pub fn stats(root: &Path) -> Result<()> {
    let config = load_config(root)?;
    let location = config
        .store_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let sync = GraphSync::open(config)?;
    let stats = sync.stats()?;

    println!("{}", "Grove Status".cyan().bold());
    println!();
    println!("  {} {}", "Store:".dimmed(), location);
    println!("  {} {}", "Nodes:".dimmed(), stats.node_count);
    println!("  {} {}", "Edges:".dimmed(), stats.edge_count);
    println!("  {} {}", "Mappings:".dimmed(), stats.mapping_count);

    sync.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fact_batch_fills_partition() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("facts.json");
        fs::write(
            &path,
            r#"{
                "project_id": "1",
                "branch": "develop",
                "classes": [{
                    "full_class_name": "a.Foo",
                    "ast_hash": "h1",
                    "methods": [{"full_name": "bar()", "ast_hash": "h2", "calls": ["baz()"]}]
                }],
                "deleted": [{"class_name": "a.Old"}]
            }"#,
        )
        .unwrap();

        let batch = FactBatch::load(&path).unwrap();
        assert_eq!(batch.classes[0].project_id, "1");
        assert_eq!(batch.classes[0].branch, "develop");
        assert_eq!(batch.classes[0].name, "Foo");
        assert_eq!(batch.classes[0].methods[0].name, "bar");
        assert_eq!(batch.classes[0].methods[0].calls, vec!["baz()"]);
        assert_eq!(batch.deleted[0].identity(), IdentityKey::class("a.Old"));
    }

    #[test]
    fn test_init_import_and_traverse() {
        let dir = tempdir().unwrap();
        init(dir.path(), Some("main".into())).unwrap();
        assert!(config_path(dir.path()).exists());

        let facts = dir.path().join("facts.json");
        fs::write(
            &facts,
            r#"{
                "project_id": "1",
                "branch": "main",
                "classes": [
                    {"full_class_name": "A", "ast_hash": "a",
                     "methods": [{"full_name": "run()", "ast_hash": "r", "calls": ["go()"]}]},
                    {"full_class_name": "B", "ast_hash": "b",
                     "methods": [{"full_name": "go()", "ast_hash": "g"}]}
                ]
            }"#,
        )
        .unwrap();
        import(dir.path(), &facts, ImportOptions::default()).unwrap();
        traverse(dir.path(), "1", "main", "A", Some("run()".into()), "CALL>", 1, 3, false)
            .unwrap();

        let sync = open(dir.path()).unwrap();
        assert_eq!(sync.stats().unwrap().node_count, 4);
        assert_eq!(sync.stats().unwrap().edge_count, 1);
    }

    #[test]
    fn test_traverse_unknown_node_fails() {
        let dir = tempdir().unwrap();
        init(dir.path(), None).unwrap();
        let err = traverse(dir.path(), "1", "main", "Nope", None, "", 1, 3, false).unwrap_err();
        assert!(err.to_string().contains("No node Nope"));
    }
}
