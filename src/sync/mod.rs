//! Synchronizer between the local project store and the remote repository.
//!
//! Every operation fetches the remote state it needs; nothing is cached
//! between calls.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::diff::DiffReport;
use crate::error::ClientError;
use crate::project::{self, LocalProject, ProjectDescriptor, ProjectStore, Removal};
use crate::remote::ScriptRepository;

/// Which descriptor fields differ between two versions of a project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorChanges {
    pub name: bool,
    pub description: bool,
    pub quick_actions: bool,
    pub scheduler: bool,
    pub icon: bool,
}

impl DescriptorChanges {
    pub fn between(old: &ProjectDescriptor, new: &ProjectDescriptor) -> Self {
        Self {
            name: old.name != new.name,
            description: old.description != new.description,
            quick_actions: old.quick_actions_enabled != new.quick_actions_enabled,
            scheduler: old.scheduler_enabled != new.scheduler_enabled,
            icon: old.icon != new.icon,
        }
    }

    pub fn any(&self) -> bool {
        self.name || self.description || self.quick_actions || self.scheduler || self.icon
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    pub id: String,
    /// Remote code before the push to the local code.
    pub diff: DiffReport,
    pub changes: DescriptorChanges,
}

impl PushOutcome {
    pub fn is_up_to_date(&self) -> bool {
        self.diff.is_noop() && !self.changes.any()
    }

    pub fn render(&self, styled: bool) -> String {
        render_sync(&self.diff, &self.changes, "Changes to `hms.toml` synced to remote.", styled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOutcome {
    pub id: String,
    /// Local code before the pull to the remote code.
    pub diff: DiffReport,
    pub changes: DescriptorChanges,
}

impl PullOutcome {
    pub fn is_up_to_date(&self) -> bool {
        self.diff.is_noop() && !self.changes.any()
    }

    pub fn render(&self, styled: bool) -> String {
        render_sync(&self.diff, &self.changes, "Changes to `hms.toml` synced from remote.", styled)
    }
}

fn render_sync(diff: &DiffReport, changes: &DescriptorChanges, synced: &str, styled: bool) -> String {
    let mut out = String::new();
    if !diff.is_noop() {
        out.push_str(&diff.render(styled));
    }
    if changes.any() {
        out.push_str(synced);
        out.push('\n');
    }
    if out.is_empty() {
        out.push_str("Everything up-to-date.\n");
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOutcome {
    pub id: String,
    pub dir: PathBuf,
    /// Size of the downloaded script body.
    pub bytes: usize,
}

#[derive(Debug, Default)]
pub struct CloneAllSummary {
    pub cloned: Vec<CloneOutcome>,
    pub failures: Vec<(String, ClientError)>,
    pub elapsed: Duration,
}

impl CloneAllSummary {
    pub fn render(&self) -> String {
        let total = self.cloned.len();
        let plural = if total == 1 { "" } else { "s" };
        format!("Finished: cloned {total} project{plural} in {:.2}s.", self.elapsed.as_secs_f64())
    }

    /// Fails when at least one project could not be cloned.
    pub fn into_result(self) -> Result<Vec<CloneOutcome>, ClientError> {
        if self.failures.is_empty() {
            Ok(self.cloned)
        } else {
            Err(ClientError::CloneIncomplete { cloned: self.cloned.len(), failed: self.failures.len() })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub local: Removal,
    pub purged: bool,
}

pub struct Synchronizer<'a, R: ?Sized> {
    store: &'a ProjectStore,
    remote: &'a R,
}

impl<'a, R: ScriptRepository + ?Sized> Synchronizer<'a, R> {
    pub fn new(store: &'a ProjectStore, remote: &'a R) -> Self {
        Self { store, remote }
    }

    /// Uploads the local project, overwriting the remote copy.
    pub async fn push(&self) -> Result<PushOutcome, ClientError> {
        let local = self.store.read_local_project()?;
        let id = local.descriptor.id.clone();

        // The baseline has to be fetched before it is overwritten.
        let baseline = self
            .remote
            .get(&id)
            .await
            .map_err(ClientError::remote("Failed to fetch remote state"))?;
        self.remote
            .modify(&local.descriptor, &local.source)
            .await
            .map_err(ClientError::remote("Failed to push local state"))?;

        let outcome = PushOutcome {
            diff: DiffReport::compute(&baseline.code, &local.source),
            changes: DescriptorChanges::between(&baseline.descriptor, &local.descriptor),
            id,
        };
        info!(id = %outcome.id, up_to_date = outcome.is_up_to_date(), "pushed project");
        Ok(outcome)
    }

    /// Replaces the local code with the remote one and merges the descriptor.
    /// The local icon always wins.
    pub async fn pull(&self) -> Result<PullOutcome, ClientError> {
        let local = self.store.read_local_project()?;
        let id = local.descriptor.id.clone();

        let remote = self
            .remote
            .get(&id)
            .await
            .map_err(ClientError::remote("Failed to pull remote state"))?;

        let diff = DiffReport::compute(&local.source, &remote.code);
        if local.source != remote.code {
            project::write_source(&local.dir, &local.descriptor, &remote.code)?;
        }

        let merged = merge_descriptor(&local.descriptor, &remote.descriptor);
        let changes = DescriptorChanges::between(&local.descriptor, &merged);
        if merged != local.descriptor {
            project::write_descriptor(&local.dir, &merged)?;
        }

        let outcome = PullOutcome { id, diff, changes };
        info!(id = %outcome.id, up_to_date = outcome.is_up_to_date(), "pulled project");
        Ok(outcome)
    }

    /// Downloads `id` into a new directory below the store root.
    pub async fn clone_project(&self, id: &str) -> Result<CloneOutcome, ClientError> {
        let record = self
            .remote
            .get(id)
            .await
            .map_err(ClientError::remote("Failed to clone project"))?;
        debug!(id, bytes = record.code.len(), "downloaded remote project");

        let dir = self.store.make_project_dir(id)?;
        let descriptor = ProjectDescriptor { id: id.to_string(), ..record.descriptor };
        project::write_descriptor(&dir, &descriptor)?;
        project::write_source(&dir, &descriptor, &record.code)?;

        Ok(CloneOutcome { id: id.to_string(), dir, bytes: record.code.len() })
    }

    /// Clones every remote project in turn. A failed clone is recorded and
    /// the loop moves on; projects cloned so far are kept.
    pub async fn clone_all(&self) -> Result<CloneAllSummary, ClientError> {
        let start = Instant::now();
        let records = self
            .remote
            .list()
            .await
            .map_err(ClientError::remote("Could not clone all homescripts: failed to load list from server"))?;

        let mut summary = CloneAllSummary::default();
        for record in records {
            let id = record.descriptor.id;
            match self.clone_project(&id).await {
                Ok(outcome) => summary.cloned.push(outcome),
                Err(err) => {
                    warn!(id = %id, error = %err, "clone failed");
                    summary.failures.push((id, err));
                }
            }
        }
        summary.elapsed = start.elapsed();
        Ok(summary)
    }

    /// Creates a project locally and then on the remote. If the remote
    /// rejects it the local directory is removed again.
    pub async fn create(&self, id: &str, name: &str) -> Result<LocalProject, ClientError> {
        let project = self.store.create_project(id, name)?;

        if let Err(source) = self.remote.create(&project.descriptor).await {
            warn!(id, "remote create failed, reverting local project");
            if let Err(revert) = self.store.remove_local_project(id) {
                warn!(id, error = %revert, "could not revert local project");
                return Err(ClientError::RevertFailed { revert, source });
            }
            return Err(ClientError::remote("Failed to create remote project")(source));
        }
        info!(id, "created project");
        Ok(project)
    }

    /// Deletes the local project, then the remote one when `purge` is set.
    /// A failing purge does not restore the local files.
    pub async fn remove(&self, id: &str, purge: bool) -> Result<RemoveOutcome, ClientError> {
        let local = self.store.remove_local_project(id)?;
        if !purge {
            return Ok(RemoveOutcome { local, purged: false });
        }

        self.remote
            .delete(id)
            .await
            .map_err(|source| ClientError::PurgeFailed { id: id.to_string(), source })?;
        info!(id, "purged project from remote");
        Ok(RemoveOutcome { local, purged: true })
    }

    pub async fn list(&self) -> Result<Vec<ProjectDescriptor>, ClientError> {
        let records = self
            .remote
            .list()
            .await
            .map_err(ClientError::remote("Failed to list projects"))?;
        Ok(records.into_iter().map(|r| r.descriptor).collect())
    }
}

/// Remote fields win except for the icon, which is kept from `local`.
fn merge_descriptor(local: &ProjectDescriptor, remote: &ProjectDescriptor) -> ProjectDescriptor {
    ProjectDescriptor {
        id: local.id.clone(),
        icon: local.icon.clone(),
        ..remote.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::diff::DiffRun;
    use crate::project::{ProjectError, DESCRIPTOR_FILE};
    use crate::remote::fake::{Call, FakeRemote};
    use crate::remote::RemoteError;

    /// A store rooted inside a freshly created local project `lamp`.
    fn lamp_workspace(source: &str) -> (tempfile::TempDir, ProjectStore) {
        let tmp = tempfile::tempdir().unwrap();
        let project = ProjectStore::new(tmp.path()).create_project("lamp", "Lamp").unwrap();
        project::write_source(&project.dir, &project.descriptor, source).unwrap();
        let store = ProjectStore::new(project.dir);
        (tmp, store)
    }

    fn read_files(store: &ProjectStore) -> (Vec<u8>, Vec<u8>) {
        (
            fs::read(store.root().join(DESCRIPTOR_FILE)).unwrap(),
            fs::read(store.root().join("lamp.hms")).unwrap(),
        )
    }

    #[tokio::test]
    async fn push_then_pull_is_a_noop() {
        let (_tmp, store) = lamp_workspace("switch('s1', on)\n");
        let remote = FakeRemote::with_script(ProjectDescriptor::new("lamp", "Lamp"), "");
        let sync = Synchronizer::new(&store, &remote);

        sync.push().await.unwrap();
        let before = read_files(&store);

        let pulled = sync.pull().await.unwrap();
        assert!(pulled.diff.is_noop());
        assert!(!pulled.changes.any());
        assert!(pulled.is_up_to_date());
        assert_eq!(read_files(&store), before);
    }

    #[tokio::test]
    async fn second_push_is_up_to_date() {
        let (_tmp, store) = lamp_workspace("print('hi')\n");
        let remote = FakeRemote::with_script(ProjectDescriptor::new("lamp", "Lamp"), "print('old')\n");
        let sync = Synchronizer::new(&store, &remote);

        let first = sync.push().await.unwrap();
        assert_eq!(
            first.diff.runs,
            vec![DiffRun::Delete("print('old')\n".into()), DiffRun::Insert("print('hi')\n".into())]
        );
        assert!(!first.is_up_to_date());

        let second = sync.push().await.unwrap();
        assert!(second.is_up_to_date());
        assert_eq!(second.render(false), "Everything up-to-date.\n");
    }

    #[tokio::test]
    async fn push_fetches_baseline_before_modifying() {
        let (_tmp, store) = lamp_workspace("print(1)");
        let remote = FakeRemote::with_script(ProjectDescriptor::new("lamp", "Lamp"), "print(0)");

        Synchronizer::new(&store, &remote).push().await.unwrap();

        assert_eq!(remote.calls(), vec![Call::Get("lamp".into()), Call::Modify("lamp".into())]);
        assert_eq!(remote.record("lamp").unwrap().code, "print(1)");
    }

    #[tokio::test]
    async fn push_reports_descriptor_changes() {
        let (_tmp, store) = lamp_workspace("");
        let mut stale = ProjectDescriptor::new("lamp", "Old name");
        stale.scheduler_enabled = true;
        let remote = FakeRemote::with_script(stale, "");

        let outcome = Synchronizer::new(&store, &remote).push().await.unwrap();
        assert!(outcome.changes.name);
        assert!(outcome.changes.scheduler);
        assert!(!outcome.changes.icon);
        assert_eq!(outcome.render(false), "Changes to `hms.toml` synced to remote.\n");
    }

    #[tokio::test]
    async fn push_without_remote_twin_fails_before_modify() {
        let (_tmp, store) = lamp_workspace("print(1)");
        let remote = FakeRemote::default();

        let err = Synchronizer::new(&store, &remote).push().await.unwrap_err();
        assert!(matches!(err, ClientError::Remote { source: RemoteError::UnprocessableEntity, .. }));
        assert_eq!(remote.calls(), vec![Call::Get("lamp".into())]);
    }

    #[tokio::test]
    async fn push_outside_a_project_is_a_local_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(tmp.path());
        let remote = FakeRemote::default();

        let err = Synchronizer::new(&store, &remote).push().await.unwrap_err();
        assert!(matches!(err, ClientError::Project(ProjectError::NotAProject(_))));
        assert_eq!(err.exit_code(), 1);
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn pull_keeps_local_icon() {
        let (_tmp, store) = lamp_workspace("");
        let mut local = store.read_local_project().unwrap().descriptor;
        local.icon = "rocket".into();
        project::write_descriptor(store.root(), &local).unwrap();

        let mut upstream = ProjectDescriptor::new("lamp", "Desk lamp");
        upstream.icon = "code".into();
        upstream.quick_actions_enabled = true;
        let remote = FakeRemote::with_script(upstream, "switch('s1', off)\n");

        let outcome = Synchronizer::new(&store, &remote).pull().await.unwrap();
        assert!(!outcome.changes.icon);
        assert!(outcome.changes.name);
        assert!(outcome.changes.quick_actions);

        let pulled = store.read_local_project().unwrap();
        assert_eq!(pulled.descriptor.icon, "rocket");
        assert_eq!(pulled.descriptor.name, "Desk lamp");
        assert!(pulled.descriptor.quick_actions_enabled);
        assert_eq!(pulled.source, "switch('s1', off)\n");

        let rendered = outcome.render(false);
        assert!(rendered.starts_with("+ switch('s1', off)\n"));
        assert!(rendered.ends_with("Changes to `hms.toml` synced from remote.\n"));
    }

    #[tokio::test]
    async fn clone_writes_remote_state() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(tmp.path());
        let mut upstream = ProjectDescriptor::new("lamp", "Lamp");
        upstream.icon = "lightbulb".into();
        let remote = FakeRemote::with_script(upstream.clone(), "print(1)");

        let outcome = Synchronizer::new(&store, &remote).clone_project("lamp").await.unwrap();
        assert_eq!(outcome.bytes, 8);

        let cloned = ProjectStore::new(outcome.dir).read_local_project().unwrap();
        assert_eq!(cloned.descriptor, upstream);
        assert_eq!(cloned.source, "print(1)");
    }

    #[tokio::test]
    async fn clone_into_existing_directory_fails_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("lamp")).unwrap();
        fs::write(tmp.path().join("lamp").join("notes.txt"), "keep").unwrap();
        let store = ProjectStore::new(tmp.path());
        let remote = FakeRemote::with_script(ProjectDescriptor::new("lamp", "Lamp"), "print(1)");

        let err = Synchronizer::new(&store, &remote).clone_project("lamp").await.unwrap_err();
        assert!(matches!(err, ClientError::Project(ProjectError::AlreadyExists(_))));
        assert!(!tmp.path().join("lamp").join(DESCRIPTOR_FILE).exists());
        assert_eq!(fs::read_to_string(tmp.path().join("lamp").join("notes.txt")).unwrap(), "keep");
    }

    #[tokio::test]
    async fn clone_all_continues_past_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(tmp.path());
        let remote = FakeRemote::default();
        for id in ["a", "b", "c"] {
            remote.insert(ProjectDescriptor::new(id, id), "print(1)");
        }
        remote.broken.lock().unwrap().insert("b".into(), RemoteError::ServiceUnavailable);

        let summary = Synchronizer::new(&store, &remote).clone_all().await.unwrap();
        let cloned: Vec<&str> = summary.cloned.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(cloned, vec!["a", "c"]);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].0, "b");
        assert!(tmp.path().join("a").join("a.hms").is_file());
        assert!(tmp.path().join("c").join("c.hms").is_file());
        assert!(!tmp.path().join("b").exists());

        let err = summary.into_result().unwrap_err();
        assert!(matches!(err, ClientError::CloneIncomplete { cloned: 2, failed: 1 }));
    }

    #[tokio::test]
    async fn create_reverts_local_project_when_remote_rejects() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(tmp.path());
        let remote = FakeRemote::default();
        *remote.create_error.lock().unwrap() = Some(RemoteError::PermissionDenied);

        let err = Synchronizer::new(&store, &remote).create("lamp", "Lamp").await.unwrap_err();
        assert_eq!(err.exit_code(), 403);
        assert!(!tmp.path().join("lamp").exists());
    }

    #[tokio::test]
    async fn create_keeps_remote_error_when_revert_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(tmp.path());
        let remote = FakeRemote::default();
        *remote.create_error.lock().unwrap() = Some(RemoteError::UnprocessableEntity);
        let dir = tmp.path().join("lamp");
        *remote.before_create.lock().unwrap() = Some(Box::new(move || {
            std::fs::remove_dir_all(&dir).unwrap();
            std::fs::write(&dir, "not a directory").unwrap();
        }));

        let err = Synchronizer::new(&store, &remote).create("lamp", "Lamp").await.unwrap_err();
        assert!(matches!(err, ClientError::RevertFailed { source: RemoteError::UnprocessableEntity, .. }));
        assert_eq!(err.exit_code(), 99);
    }

    #[tokio::test]
    async fn create_registers_project_remotely() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(tmp.path());
        let remote = FakeRemote::default();

        let project = Synchronizer::new(&store, &remote).create("lamp", "").await.unwrap();
        assert_eq!(project.descriptor.name, "Lamp");
        assert_eq!(remote.record("lamp").unwrap().descriptor, project.descriptor);
    }

    #[tokio::test]
    async fn remove_deletes_local_files_even_when_purge_conflicts() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(tmp.path());
        store.create_project("lamp", "Lamp").unwrap();
        let remote = FakeRemote::with_script(ProjectDescriptor::new("lamp", "Lamp"), "");
        remote.dependents.lock().unwrap().push("lamp".into());

        let err = Synchronizer::new(&store, &remote).remove("lamp", true).await.unwrap_err();
        assert!(matches!(err, ClientError::PurgeFailed { source: RemoteError::Conflict, .. }));
        assert!(!tmp.path().join("lamp").exists());
        assert!(remote.record("lamp").is_some());
    }

    #[tokio::test]
    async fn remove_without_purge_leaves_remote_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(tmp.path());
        let remote = FakeRemote::default();

        let outcome = Synchronizer::new(&store, &remote).remove("ghost", false).await.unwrap();
        assert_eq!(outcome, RemoveOutcome { local: Removal::Absent, purged: false });
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn list_returns_descriptors() {
        let remote = FakeRemote::default();
        remote.insert(ProjectDescriptor::new("b", "B"), "");
        remote.insert(ProjectDescriptor::new("a", "A"), "");
        let tmp = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(tmp.path());

        let ids: Vec<String> = Synchronizer::new(&store, &remote)
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
