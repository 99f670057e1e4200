//! Database transfer pipeline: local dump, mirror, remote import.

use std::path::PathBuf;

use serde_json::json;
use tracing::warn;

use crate::exec::{CommandSpec, remote_shell_quote};
use crate::inventory::SettingKey;

use super::service::RunContext;
use super::state::{DatabaseSelection, ItemKind};

/// Remote credential files the import command reads on the far side.
const REMOTE_MYSQL_PASSWORD_FILE: &str = "/usr/local/etc/panel/mysql_root_password";
const REMOTE_POSTGRES_PASSWORD_FILE: &str = "/usr/local/etc/panel/postgresql_password";

/// Migrate one database. The temporary dump file is removed afterwards no
/// matter which step failed.
pub(crate) fn migrate(ctx: &RunContext<'_>, item: &DatabaseSelection) {
    let display = format!("{} ({})", item.name, item.kind);
    ctx.state.start_item(ItemKind::Database, &display);
    ctx.state.push_log(format!("[database] start migrating: {display}"));

    let dump_path = PathBuf::from(format!("/tmp/panel_migration_{}_{}.sql", item.kind, item.name));

    let outcome = run_pipeline(ctx, item, &display, &dump_path);

    let _ = std::fs::remove_file(&dump_path);

    match outcome {
        Ok(()) => {
            ctx.state.finish_item(ItemKind::Database, &display, Ok(()));
            ctx.state.push_log(format!("[{display}] database migration completed"));
        }
        Err(message) => ctx.fail_item(ItemKind::Database, &display, message),
    }
}

/// The failable steps, in order. The first error aborts the rest of this
/// item's pipeline, never the outer loop.
fn run_pipeline(
    ctx: &RunContext<'_>,
    item: &DatabaseSelection,
    display: &str,
    dump_path: &std::path::Path,
) -> Result<(), String> {
    let dump_spec = match item.kind.as_str() {
        "mysql" => {
            let mut spec = CommandSpec::new(
                "mysqldump",
                ["-u", "root", "--single-transaction", "--quick", item.name.as_str()],
            )
            .stdout_to(dump_path);
            if let Some(password) = ctx.settings.get(SettingKey::MysqlRootPassword) {
                spec = spec.env("MYSQL_PWD", password);
            }
            spec
        }
        "postgresql" => {
            let mut spec = CommandSpec::new(
                "pg_dump",
                ["-h", "127.0.0.1", "-U", "postgres", item.name.as_str()],
            )
            .stdout_to(dump_path);
            if let Some(password) = ctx.settings.get(SettingKey::PostgresPassword) {
                spec = spec.env("PGPASSWORD", password);
            }
            spec
        }
        other => return Err(format!("unsupported database type: {other}")),
    };

    ctx.state.push_log(format!("[{display}] exporting database"));
    ctx.state.push_log(format!("$ {}", dump_spec.display()));
    ctx.runner
        .run(&dump_spec)
        .map_err(|err| format!("database export failed: {err}"))?;

    ctx.state
        .push_log(format!("[{display}] sending backup to remote server"));
    let transfer_spec = ctx.mirror.file_spec(dump_path);
    ctx.state.push_log(format!("$ {}", transfer_spec.display()));
    let output = ctx
        .runner
        .run(&transfer_spec)
        .map_err(|err| format!("backup transfer failed: {err}"))?;
    if !output.stdout.trim().is_empty() {
        ctx.state.push_log(output.stdout.trim_end());
    }

    if let Err(err) = ctx
        .client
        .create_database(&json!({ "server_id": item.server_id, "name": item.name }))
    {
        warn!(database = %item.name, error = %err, "remote database creation failed");
    }

    ctx.state
        .push_log(format!("[{display}] importing database on remote server"));
    let import_cmd = match item.kind.as_str() {
        "mysql" => format!(
            "MYSQL_PWD=$(cat {REMOTE_MYSQL_PASSWORD_FILE} 2>/dev/null) mysql -u root {} < {}",
            remote_shell_quote(&item.name),
            dump_path.display()
        ),
        _ => format!(
            "PGPASSWORD=$(cat {REMOTE_POSTGRES_PASSWORD_FILE} 2>/dev/null) psql -h 127.0.0.1 -U postgres {} < {}",
            remote_shell_quote(&item.name),
            dump_path.display()
        ),
    };
    let import_spec = ctx.mirror.remote_spec(&import_cmd);
    ctx.state.push_log(format!("$ {}", import_spec.display()));
    let output = ctx
        .runner
        .run(&import_spec)
        .map_err(|err| format!("remote import failed: {err}"))?;
    if !output.stdout.trim().is_empty() {
        ctx.state.push_log(output.stdout.trim_end());
    }

    Ok(())
}
