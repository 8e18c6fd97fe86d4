//! Local project store: `<id>/hms.toml` plus `<id>/<id>.hms`.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const DESCRIPTOR_FILE: &str = "hms.toml";
pub const SCRIPT_EXTENSION: &str = "hms";
pub const DEFAULT_ICON: &str = "code";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "quickActions", default)]
    pub quick_actions_enabled: bool,
    #[serde(rename = "scheduler", default)]
    pub scheduler_enabled: bool,
    #[serde(default = "default_icon")]
    pub icon: String,
}

fn default_icon() -> String {
    DEFAULT_ICON.to_string()
}

impl ProjectDescriptor {
    /// Descriptor of a freshly created project; an empty name falls back to
    /// the title-cased id.
    pub fn new(id: &str, name: &str) -> Self {
        let name = if name.is_empty() { title_case(id) } else { name.to_string() };
        Self {
            id: id.to_string(),
            name,
            description: String::new(),
            quick_actions_enabled: false,
            scheduler_enabled: false,
            icon: default_icon(),
        }
    }

    pub fn script_file_name(&self) -> String {
        script_file_name(&self.id)
    }
}

/// Lowercases `text` and capitalizes the first letter of every word.
/// Words are separated by anything that is neither alphanumeric nor `_`.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word_start = true;
    for c in text.chars() {
        if word_start {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        word_start = !(c.is_alphanumeric() || c == '_');
    }
    out
}

pub fn script_file_name(id: &str) -> String {
    format!("{id}.{SCRIPT_EXTENSION}")
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("not a hms-project: `hms.toml` not found in {}", .0.display())]
    NotAProject(PathBuf),
    #[error("failed to initialize project root at `{}`: specified directory already exists", .0.display())]
    AlreadyExists(PathBuf),
    #[error("{context} `{}`", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse `{}`", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to encode `hms.toml`")]
    Encode(#[from] toml::ser::Error),
}

fn io_err<'a>(context: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> ProjectError + 'a {
    move |source| ProjectError::Io { context, path: path.to_path_buf(), source }
}

/// A project as read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalProject {
    pub dir: PathBuf,
    pub descriptor: ProjectDescriptor,
    pub source: String,
}

/// What `remove_local_project` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    Absent,
}

/// Filesystem access rooted at one directory. Writes are not transactional:
/// a failure between the descriptor and the script write leaves both behind.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Creates `<root>/<id>` with a placeholder script and a default descriptor.
    pub fn create_project(&self, id: &str, name: &str) -> Result<LocalProject, ProjectError> {
        let dir = self.make_project_dir(id)?;
        let descriptor = ProjectDescriptor::new(id, name);
        let source = format!("# Write your code for `{id}` below");
        write_source(&dir, &descriptor, &source)?;
        write_descriptor(&dir, &descriptor)?;
        debug!(id, dir = %dir.display(), "created local project");
        Ok(LocalProject { dir, descriptor, source })
    }

    /// Creates the empty directory for a new or cloned project.
    pub fn make_project_dir(&self, id: &str) -> Result<PathBuf, ProjectError> {
        let dir = self.project_dir(id);
        match fs::create_dir(&dir) {
            Ok(()) => Ok(dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(ProjectError::AlreadyExists(dir)),
            Err(source) => Err(ProjectError::Io { context: "failed to create project root", path: dir, source }),
        }
    }

    /// Reads the project whose descriptor lives directly in the root.
    pub fn read_local_project(&self) -> Result<LocalProject, ProjectError> {
        read_project(&self.root)
    }

    pub fn remove_local_project(&self, id: &str) -> Result<Removal, ProjectError> {
        let dir = self.project_dir(id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!(id, "removed local project");
                Ok(Removal::Removed)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Removal::Absent),
            Err(source) => Err(ProjectError::Io { context: "failed to remove project root", path: dir, source }),
        }
    }
}

pub fn read_project(dir: &Path) -> Result<LocalProject, ProjectError> {
    let descriptor_path = dir.join(DESCRIPTOR_FILE);
    let text = match fs::read_to_string(&descriptor_path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ProjectError::NotAProject(dir.to_path_buf()));
        }
        Err(source) => {
            return Err(ProjectError::Io { context: "failed to read", path: descriptor_path, source });
        }
    };
    let descriptor: ProjectDescriptor = toml::from_str(&text)
        .map_err(|source| ProjectError::Parse { path: descriptor_path.clone(), source })?;

    let script_path = dir.join(descriptor.script_file_name());
    let source = fs::read_to_string(&script_path).map_err(io_err("failed to read homescript file", &script_path))?;

    Ok(LocalProject { dir: dir.to_path_buf(), descriptor, source })
}

pub fn write_descriptor(dir: &Path, descriptor: &ProjectDescriptor) -> Result<(), ProjectError> {
    let path = dir.join(DESCRIPTOR_FILE);
    let text = toml::to_string(descriptor)?;
    fs::write(&path, text).map_err(io_err("failed to update", &path))
}

pub fn write_source(dir: &Path, descriptor: &ProjectDescriptor, source: &str) -> Result<(), ProjectError> {
    let path = dir.join(descriptor.script_file_name());
    fs::write(&path, source).map_err(io_err("failed to update", &path))
}
