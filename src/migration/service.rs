//! The migration orchestrator.
//!
//! [`MigrationService`] owns the collaborator seams and drives the step
//! machine: precheck → item listing → start (background job) → done, with
//! reset back to idle. The job runs key provisioning and the item
//! pipelines strictly sequentially; state mutations take the exclusive
//! lock only for the mutation itself, so status reads stay responsive
//! while transfers run.

use std::sync::Arc;

use tracing::error;

use crate::config::MigrateConfig;
use crate::exec::CommandRunner;
use crate::inventory::{DatabaseRepo, ProjectRepo, SettingStore, WebsiteRepo};
use crate::remote::{ConnectionInfo, RemoteClient};
use crate::ssh::{KeyProvisioner, TrustError, TrustStore};
use crate::transfer::Mirror;

use super::error::MigrateError;
use super::job::{CancelToken, MigrationJob};
use super::protocol::{ItemsResponse, PrecheckResponse, ResultsResponse, StatusResponse};
use super::state::{ItemKind, ItemSelection, MigrationHandle, MigrationStep};
use super::{database, project, website};

const RUN_STARTED: &str = "===== Migration started =====";
const RUN_COMPLETED: &str = "===== Migration completed =====";

/// Everything an item pipeline needs for one run.
pub(crate) struct RunContext<'a> {
    pub state: &'a MigrationHandle,
    pub client: &'a RemoteClient,
    pub runner: &'a dyn CommandRunner,
    pub mirror: Mirror,
    pub config: &'a MigrateConfig,
    pub websites: &'a dyn WebsiteRepo,
    pub projects: &'a dyn ProjectRepo,
    pub settings: &'a dyn SettingStore,
}

impl RunContext<'_> {
    /// Finalize an item as failed and record the failure in the transcript.
    pub(crate) fn fail_item(&self, kind: ItemKind, name: &str, message: String) {
        self.state.finish_item(kind, name, Err(message.clone()));
        self.state.push_log(format!("❌ failed [{name}]: {message}"));
    }
}

/// The migration subsystem's entry point. One instance per panel process;
/// independently constructible so tests can run isolated attempts.
pub struct MigrationService {
    config: MigrateConfig,
    state: MigrationHandle,
    runner: Arc<dyn CommandRunner>,
    websites: Arc<dyn WebsiteRepo>,
    databases: Arc<dyn DatabaseRepo>,
    projects: Arc<dyn ProjectRepo>,
    settings: Arc<dyn SettingStore>,
}

impl MigrationService {
    pub fn new(
        config: MigrateConfig,
        runner: Arc<dyn CommandRunner>,
        websites: Arc<dyn WebsiteRepo>,
        databases: Arc<dyn DatabaseRepo>,
        projects: Arc<dyn ProjectRepo>,
        settings: Arc<dyn SettingStore>,
    ) -> Self {
        Self {
            config,
            state: MigrationHandle::new(),
            runner,
            websites,
            databases,
            projects,
            settings,
        }
    }

    /// Cloneable handle to this service's state, for the progress
    /// publisher and for tests.
    pub fn state(&self) -> MigrationHandle {
        self.state.clone()
    }

    pub fn config(&self) -> &MigrateConfig {
        &self.config
    }

    /// Validate the peer connection and fetch its environment map. State
    /// is only touched on success.
    pub fn precheck(&self, conn: ConnectionInfo) -> Result<PrecheckResponse, MigrateError> {
        if conn.url.trim().is_empty() {
            return Err(MigrateError::Validation("url is required".into()));
        }
        if conn.token.is_empty() {
            return Err(MigrateError::Validation("token is required".into()));
        }
        if self.state.step() == MigrationStep::Running {
            return Err(MigrateError::Conflict(MigrateError::ALREADY_RUNNING));
        }

        let client = RemoteClient::new(conn.clone(), self.config.http_timeout)
            .map_err(|err| MigrateError::Connection(err.to_string()))?;
        let remote = client
            .installed_environment()
            .map_err(|err| MigrateError::Connection(err.to_string()))?;

        self.state.store_connection(conn);
        Ok(PrecheckResponse { remote })
    }

    /// Enumerate local migration candidates. The first successful listing
    /// after a precheck advances the step to Select.
    pub fn items(&self) -> Result<ItemsResponse, MigrateError> {
        let websites = self
            .websites
            .list()
            .map_err(|err| MigrateError::Internal(format!("failed to get website list: {err}")))?;
        let databases = self
            .databases
            .list()
            .map_err(|err| MigrateError::Internal(format!("failed to get database list: {err}")))?;
        let projects = self
            .projects
            .list()
            .map_err(|err| MigrateError::Internal(format!("failed to get project list: {err}")))?;

        self.state.advance_to_select();

        Ok(ItemsResponse {
            websites,
            databases,
            projects,
        })
    }

    /// Launch the background job for `selection`. At most one job exists
    /// at a time; the Running check and the transition into Running happen
    /// atomically under the exclusive lock.
    pub fn start(&self, selection: ItemSelection) -> Result<MigrationJob, MigrateError> {
        let conn = self.state.begin_run(selection.clone())?;

        let config = self.config.clone();
        let state = self.state.clone();
        let runner = self.runner.clone();
        let websites = self.websites.clone();
        let projects = self.projects.clone();
        let settings = self.settings.clone();

        Ok(MigrationJob::spawn(move |token| {
            run_migration(
                &config, &state, conn, &selection, token, &*runner, &*websites, &*projects,
                &*settings,
            );
        }))
    }

    /// Clear the attempt back to Idle. Refused while a job is running.
    pub fn reset(&self) -> Result<(), MigrateError> {
        self.state.reset()
    }

    pub fn status(&self) -> StatusResponse {
        let snapshot = self.state.snapshot();
        StatusResponse {
            step: snapshot.step,
            results: snapshot.results,
            started_at: snapshot.started_at,
            ended_at: snapshot.ended_at,
        }
    }

    pub fn results(&self) -> ResultsResponse {
        let snapshot = self.state.snapshot();
        ResultsResponse {
            step: snapshot.step,
            results: snapshot.results,
            logs: self.state.logs(),
            started_at: snapshot.started_at,
            ended_at: snapshot.ended_at,
        }
    }

    /// Inbound trust endpoint: record a peer's public key in this host's
    /// `authorized_keys`.
    pub fn add_ssh_key(&self, public_key: &str) -> Result<(), MigrateError> {
        TrustStore::new(&self.config.authorized_keys_path)
            .add(public_key)
            .map_err(trust_error)
    }

    /// Inbound trust endpoint: remove a peer's public key again.
    pub fn remove_ssh_key(&self, public_key: &str) -> Result<(), MigrateError> {
        TrustStore::new(&self.config.authorized_keys_path)
            .remove(public_key)
            .map_err(trust_error)
    }
}

fn trust_error(err: TrustError) -> MigrateError {
    match err {
        TrustError::EmptyKey => MigrateError::Validation(err.to_string()),
        TrustError::Io { .. } => MigrateError::Internal(err.to_string()),
    }
}

/// The background job body: trust setup, the three item loops, trust
/// teardown, finalization. Runs on the job thread; every state mutation
/// goes through the handle's short exclusive-lock methods.
#[allow(clippy::too_many_arguments)]
fn run_migration(
    config: &MigrateConfig,
    state: &MigrationHandle,
    conn: ConnectionInfo,
    selection: &ItemSelection,
    token: CancelToken,
    runner: &dyn CommandRunner,
    websites: &dyn WebsiteRepo,
    projects: &dyn ProjectRepo,
    settings: &dyn SettingStore,
) {
    state.push_log(RUN_STARTED);

    let client = match RemoteClient::new(conn.clone(), config.http_timeout) {
        Ok(client) => client,
        Err(err) => {
            error!(error = %err, "HTTP client construction failed");
            state.push_log(format!("❌ failed to reach remote panel: {err}"));
            state.finish_run();
            state.push_log(RUN_COMPLETED);
            return;
        }
    };

    let provisioner = KeyProvisioner::new(runner, &config.key_path);
    if let Err(err) = provisioner.setup(&client, state) {
        state.push_log(format!("❌ SSH key setup failed: {err}"));
        state.finish_run();
        state.push_log(RUN_COMPLETED);
        return;
    }

    let mirror = Mirror::new(
        conn.host(),
        state.key_path().as_deref(),
        config.ssh_connect_timeout,
    );
    let ctx = RunContext {
        state,
        client: &client,
        runner,
        mirror,
        config,
        websites,
        projects,
        settings,
    };

    'run: {
        for site in &selection.websites {
            if halt_requested(&ctx, &token, selection) {
                break 'run;
            }
            website::migrate(&ctx, site);
        }
        for db in &selection.databases {
            if halt_requested(&ctx, &token, selection) {
                break 'run;
            }
            database::migrate(&ctx, db);
        }
        for proj in &selection.projects {
            if halt_requested(&ctx, &token, selection) {
                break 'run;
            }
            project::migrate(&ctx, proj);
        }
    }

    provisioner.teardown(&client, state);

    state.finish_run();
    state.push_log(RUN_COMPLETED);
}

/// Checked before each item: cancellation and stop-on-error both end the
/// loop early; items never started produce no result rows.
fn halt_requested(ctx: &RunContext<'_>, token: &CancelToken, selection: &ItemSelection) -> bool {
    if token.is_cancelled() {
        ctx.state.push_log("migration cancelled, skipping remaining items");
        return true;
    }
    if selection.stop_on_error && ctx.state.last_item_failed() {
        ctx.state.push_log("stop on error: skipping remaining items");
        return true;
    }
    false
}
