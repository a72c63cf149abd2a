//! Codebase symbol index used by the outdated-import check.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::Value;
use toml::Table;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::core::errors::{Result, SuiteError};
use crate::core::model::Language;
use crate::detectors::redundancy::imports::strip_script_extension;
use crate::lang::collector::SKIPPED_DIRS;

/// Answers whether a module path exists in the codebase under test.
pub trait SymbolIndex: Send + Sync {
    fn module_exists(&self, module: &str) -> bool;
}

/// Fixed set of known modules.
#[derive(Debug, Clone, Default)]
pub struct StaticSymbolIndex {
    modules: BTreeSet<String>,
}

impl StaticSymbolIndex {
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            modules: modules.into_iter().map(Into::into).collect(),
        }
    }
}

impl SymbolIndex for StaticSymbolIndex {
    fn module_exists(&self, module: &str) -> bool {
        contains_module(&self.modules, module)
    }
}

/// Module index built by scanning a workspace.
///
/// Python files register their dotted path (`src/app/db.py` gives
/// `src.app.db` and `app.db`), JS/TS files their extensionless path, and
/// third-party packages their package names. Packages come from the
/// manifests (`package.json`, `requirements.txt`, `pyproject.toml`,
/// `Pipfile`, `setup.cfg`) and from what is installed (`node_modules`, the
/// `site-packages` of the workspace virtualenv or of `$VIRTUAL_ENV`).
#[derive(Debug, Clone, Default)]
pub struct WorkspaceSymbolIndex {
    modules: BTreeSet<String>,
}

impl WorkspaceSymbolIndex {
    pub fn build(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(SuiteError::config(format!(
                "Workspace root is not a directory: {}",
                root.display()
            )));
        }

        let mut modules = BTreeSet::new();
        for entry in WalkDir::new(root)
            .into_iter()
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                entry.depth() == 0 || !(name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref()))
            })
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
        {
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            match Language::from_path(path) {
                Some(Language::Python) => register_python(&mut modules, &relative),
                Some(_) => register_ecma(&mut modules, &relative),
                None => {}
            }
        }

        register_package_json(&mut modules, &root.join("package.json"))?;
        register_requirements(&mut modules, &root.join("requirements.txt"))?;
        register_pyproject(&mut modules, &root.join("pyproject.toml"))?;
        register_pipfile(&mut modules, &root.join("Pipfile"))?;
        register_setup_cfg(&mut modules, &root.join("setup.cfg"))?;
        register_node_modules(&mut modules, &root.join("node_modules"));
        for env in virtualenvs(root) {
            register_site_packages(&mut modules, &env);
        }

        info!("Indexed {} modules under {}", modules.len(), root.display());
        Ok(Self { modules })
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl SymbolIndex for WorkspaceSymbolIndex {
    fn module_exists(&self, module: &str) -> bool {
        contains_module(&self.modules, module)
    }
}

/// Exact match, a known package containing `module`, or a module below it.
fn contains_module(modules: &BTreeSet<String>, module: &str) -> bool {
    let module = module.trim_start_matches("./");
    if modules.contains(module) {
        return true;
    }
    // importing a package whose modules are indexed
    for separator in ['.', '/'] {
        let prefix = format!("{}{}", module, separator);
        if modules
            .range(prefix.clone()..)
            .next()
            .is_some_and(|m| m.starts_with(&prefix))
        {
            return true;
        }
    }
    // installed third-party package roots
    let root = if module.starts_with('@') {
        module.splitn(3, '/').take(2).collect::<Vec<_>>().join("/")
    } else {
        module.split(['.', '/']).next().unwrap_or(module).to_string()
    };
    modules.contains(&format!("pkg:{}", root))
}

fn register_python(modules: &mut BTreeSet<String>, relative: &str) {
    let Some(stem) = relative.strip_suffix(".py") else {
        return;
    };
    let mut dotted = stem.replace('/', ".");
    if let Some(package) = dotted.strip_suffix(".__init__") {
        dotted = package.to_string();
    } else if dotted == "__init__" {
        return;
    }
    for prefix in ["src.", "lib."] {
        if let Some(stripped) = dotted.strip_prefix(prefix) {
            modules.insert(stripped.to_string());
        }
    }
    debug!("Indexed python module {}", dotted);
    modules.insert(dotted);
}

fn register_ecma(modules: &mut BTreeSet<String>, relative: &str) {
    let stem = strip_script_extension(relative);
    if stem == relative {
        return;
    }
    if let Some(dir) = stem.strip_suffix("/index") {
        modules.insert(dir.to_string());
    }
    modules.insert(stem.to_string());
}

fn register_package_json(modules: &mut BTreeSet<String>, path: &Path) -> Result<()> {
    if !path.is_file() {
        return Ok(());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| SuiteError::io(format!("Failed to read {}", path.display()), e))?;
    let manifest: Value = serde_json::from_str(&content)?;
    for section in ["dependencies", "devDependencies", "peerDependencies", "optionalDependencies"] {
        if let Some(deps) = manifest.get(section).and_then(Value::as_object) {
            modules.extend(deps.keys().map(|name| format!("pkg:{}", name)));
        }
    }
    if let Some(name) = manifest.get("name").and_then(Value::as_str) {
        modules.insert(format!("pkg:{}", name));
    }
    Ok(())
}

fn read_manifest(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    std::fs::read_to_string(path)
        .map(Some)
        .map_err(|e| SuiteError::io(format!("Failed to read {}", path.display()), e))
}

/// Import-style name of a PEP 508 requirement such as `Flask-Login[extra]>=0.6`.
fn requirement_name(requirement: &str) -> Option<String> {
    let requirement = requirement.split('#').next().unwrap_or_default().trim();
    if requirement.starts_with('-') {
        return None;
    }
    let name: String = requirement
        .chars()
        .take_while(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    (!name.is_empty()).then(|| name.to_lowercase().replace(['-', '.'], "_"))
}

fn register_requirement(modules: &mut BTreeSet<String>, requirement: &str) {
    if let Some(name) = requirement_name(requirement) {
        modules.insert(format!("pkg:{}", name));
    }
}

fn register_requirements(modules: &mut BTreeSet<String>, path: &Path) -> Result<()> {
    let Some(content) = read_manifest(path)? else {
        return Ok(());
    };
    for line in content.lines() {
        register_requirement(modules, line);
    }
    Ok(())
}

fn register_pyproject(modules: &mut BTreeSet<String>, path: &Path) -> Result<()> {
    let Some(content) = read_manifest(path)? else {
        return Ok(());
    };
    let manifest: Table = content.parse()?;

    if let Some(project) = manifest.get("project").and_then(toml::Value::as_table) {
        if let Some(name) = project.get("name").and_then(toml::Value::as_str) {
            register_requirement(modules, name);
        }
        for requirement in string_array(project.get("dependencies")) {
            register_requirement(modules, requirement);
        }
        if let Some(extras) = project.get("optional-dependencies").and_then(toml::Value::as_table) {
            for group in extras.values() {
                for requirement in string_array(Some(group)) {
                    register_requirement(modules, requirement);
                }
            }
        }
    }

    if let Some(groups) = manifest.get("dependency-groups").and_then(toml::Value::as_table) {
        for group in groups.values() {
            for requirement in string_array(Some(group)) {
                register_requirement(modules, requirement);
            }
        }
    }

    let Some(poetry) = manifest
        .get("tool")
        .and_then(|tool| tool.get("poetry"))
        .and_then(toml::Value::as_table)
    else {
        return Ok(());
    };
    if let Some(name) = poetry.get("name").and_then(toml::Value::as_str) {
        register_requirement(modules, name);
    }
    let mut tables = vec![poetry.get("dependencies"), poetry.get("dev-dependencies")];
    if let Some(groups) = poetry.get("group").and_then(toml::Value::as_table) {
        tables.extend(groups.values().map(|group| group.get("dependencies")));
    }
    for table in tables.into_iter().flatten().filter_map(toml::Value::as_table) {
        for name in table.keys().filter(|name| name.as_str() != "python") {
            register_requirement(modules, name);
        }
    }
    Ok(())
}

fn string_array(value: Option<&toml::Value>) -> impl Iterator<Item = &str> {
    value
        .and_then(toml::Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(toml::Value::as_str)
}

fn register_pipfile(modules: &mut BTreeSet<String>, path: &Path) -> Result<()> {
    let Some(content) = read_manifest(path)? else {
        return Ok(());
    };
    let manifest: Table = content.parse()?;
    for section in ["packages", "dev-packages"] {
        if let Some(packages) = manifest.get(section).and_then(toml::Value::as_table) {
            for name in packages.keys() {
                register_requirement(modules, name);
            }
        }
    }
    Ok(())
}

/// `install_requires` and `extras_require` entries of `[options]`.
fn register_setup_cfg(modules: &mut BTreeSet<String>, path: &Path) -> Result<()> {
    let Some(content) = read_manifest(path)? else {
        return Ok(());
    };
    let mut section = String::new();
    let mut in_requirements = false;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            section = trimmed.trim_matches(['[', ']']).trim().to_string();
            in_requirements = false;
            continue;
        }
        let continuation = line.starts_with([' ', '\t']);
        if !continuation {
            in_requirements = false;
            if let Some((key, value)) = trimmed.split_once('=') {
                let key = key.trim();
                if (section == "options" && key == "install_requires") || section == "options.extras_require" {
                    in_requirements = true;
                    register_requirement(modules, value);
                }
            }
        } else if in_requirements {
            register_requirement(modules, trimmed);
        }
    }
    Ok(())
}
fn register_node_modules(modules: &mut BTreeSet<String>, path: &Path) {
    let Ok(entries) = std::fs::read_dir(path) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('@') {
            if let Ok(scoped) = std::fs::read_dir(entry.path()) {
                for package in scoped.flatten() {
                    modules.insert(format!("pkg:{}/{}", name, package.file_name().to_string_lossy()));
                }
            }
        } else if !name.starts_with('.') {
            modules.insert(format!("pkg:{}", name));
        }
    }
}

/// Workspace virtualenvs plus the active one.
fn virtualenvs(root: &Path) -> Vec<PathBuf> {
    let mut envs: Vec<PathBuf> = [".venv", "venv"]
        .iter()
        .map(|name| root.join(name))
        .filter(|path| path.is_dir())
        .collect();
    if let Some(active) = std::env::var_os("VIRTUAL_ENV").map(PathBuf::from) {
        if active.is_dir() && !envs.contains(&active) {
            envs.push(active);
        }
    }
    envs
}

/// Top-level importable names below `lib/python*/site-packages`.
fn register_site_packages(modules: &mut BTreeSet<String>, env: &Path) {
    let mut site_dirs = vec![env.join("Lib").join("site-packages")];
    if let Ok(entries) = std::fs::read_dir(env.join("lib")) {
        site_dirs.extend(
            entries
                .flatten()
                .filter(|entry| entry.file_name().to_string_lossy().starts_with("python"))
                .map(|entry| entry.path().join("site-packages")),
        );
    }

    for site in site_dirs {
        let Ok(entries) = std::fs::read_dir(&site) else {
            continue;
        };
        debug!("Indexing installed packages in {}", site.display());
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(['_', '.']) || name.ends_with(".dist-info") || name.ends_with(".egg-info") {
                continue;
            }
            let module = if entry.path().is_dir() {
                Some(name.as_str())
            } else {
                name.strip_suffix(".py")
                    .or_else(|| name.split_once(".cpython").map(|(stem, _)| stem))
                    .or_else(|| name.strip_suffix(".so"))
                    .or_else(|| name.strip_suffix(".pyd"))
            };
            if let Some(module) = module {
                modules.insert(format!("pkg:{}", module));
            }
        }
    }
}
