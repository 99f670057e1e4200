//! Managed-project transfer pipeline.

use std::path::Path;

use serde_json::json;
use tracing::warn;

use super::service::RunContext;
use super::state::{ItemKind, ProjectSelection};

/// Migrate one project: best-effort remote creation, directory mirror when
/// a path is configured, service-unit mirror as a warning-only step.
pub(crate) fn migrate(ctx: &RunContext<'_>, item: &ProjectSelection) {
    ctx.state.start_item(ItemKind::Project, &item.name);
    ctx.state.push_log(format!("[project] start migrating: {}", item.name));

    let details = match ctx.projects.get(item.id) {
        Ok(details) => details,
        Err(err) => {
            ctx.fail_item(ItemKind::Project, &item.name, format!("failed to get project detail: {err}"));
            return;
        }
    };

    ctx.state
        .push_log(format!("[{}] creating project on remote server", item.name));
    let create_body = json!({
        "name": details.name,
        "type": details.kind,
        "root_dir": details.root_dir,
        "exec_start": details.exec_start,
        "user": details.user,
    });
    if let Err(err) = ctx.client.create_project(&create_body) {
        warn!(project = %item.name, error = %err, "remote project creation failed");
        ctx.state.push_log(format!(
            "[{}] warning: failed to create remote project, syncing files anyway: {err}",
            item.name
        ));
    }

    // A project without a configured directory has nothing to mirror;
    // that is not a failure.
    if !item.path.is_empty() {
        ctx.state
            .push_log(format!("[{}] syncing directory: {}", item.name, item.path));
        let spec = ctx.mirror.dir_spec(Path::new(&item.path));
        ctx.state.push_log(format!("$ {}", spec.display()));
        match ctx.runner.run(&spec) {
            Ok(output) => {
                if !output.stdout.trim().is_empty() {
                    ctx.state.push_log(output.stdout.trim_end());
                }
            }
            Err(err) => {
                ctx.fail_item(ItemKind::Project, &item.name, format!("rsync failed: {err}"));
                return;
            }
        }
    }

    let service_file = format!("/etc/systemd/system/{}.service", item.name);
    ctx.state
        .push_log(format!("[{}] syncing systemd service file", item.name));
    let spec = ctx.mirror.file_spec(Path::new(&service_file));
    ctx.state.push_log(format!("$ {}", spec.display()));
    if let Err(err) = ctx.runner.run(&spec) {
        ctx.state.push_log(format!(
            "[{}] warning: service file sync failed: {err}",
            item.name
        ));
    }

    ctx.state.finish_item(ItemKind::Project, &item.name, Ok(()));
    ctx.state
        .push_log(format!("[{}] project migration completed", item.name));
}
