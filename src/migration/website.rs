//! Website transfer pipeline.

use serde_json::json;
use tracing::warn;

use super::service::RunContext;
use super::state::{ItemKind, WebsiteSelection};

/// Migrate one website. Success is decided solely by the primary root
/// mirror; remote creation and custom-path sync are warning-only.
pub(crate) fn migrate(ctx: &RunContext<'_>, item: &WebsiteSelection) {
    ctx.state.start_item(ItemKind::Website, &item.name);
    ctx.state.push_log(format!("[website] start migrating: {}", item.name));

    let details = match ctx.websites.get(item.id) {
        Ok(details) => details,
        Err(err) => {
            ctx.fail_item(ItemKind::Website, &item.name, format!("failed to get website detail: {err}"));
            return;
        }
    };

    ctx.state
        .push_log(format!("[{}] creating website on remote server", item.name));
    let listens = if details.listens.is_empty() {
        vec!["80".to_string()]
    } else {
        details.listens.clone()
    };
    let create_body = json!({
        "name": details.name,
        "listens": listens,
        "domains": details.domains,
        "path": details.path,
        "type": details.kind,
    });
    if let Err(err) = ctx.client.create_website(&create_body) {
        warn!(website = %item.name, error = %err, "remote website creation failed");
        ctx.state.push_log(format!(
            "[{}] warning: failed to create remote website, syncing files anyway: {err}",
            item.name
        ));
    }

    let site_dir = ctx.config.sites_root.join(&item.name);
    ctx.state
        .push_log(format!("[{}] syncing directory: {}/", item.name, site_dir.display()));
    let spec = ctx.mirror.dir_spec(&site_dir);
    ctx.state.push_log(format!("$ {}", spec.display()));
    match ctx.runner.run(&spec) {
        Ok(output) => {
            if !output.stdout.trim().is_empty() {
                ctx.state.push_log(output.stdout.trim_end());
            }
        }
        Err(err) => {
            ctx.fail_item(ItemKind::Website, &item.name, format!("rsync failed: {err}"));
            return;
        }
    }

    // A custom serving path outside the site root (and not the default
    // `<root>/public`) has to travel too, but only as a warning.
    let default_public = site_dir.join("public");
    if !item.path.is_empty()
        && item.path != default_public.display().to_string()
        && item.path != site_dir.display().to_string()
    {
        ctx.state
            .push_log(format!("[{}] syncing custom directory: {}", item.name, item.path));
        let spec = ctx.mirror.dir_spec(std::path::Path::new(&item.path));
        ctx.state.push_log(format!("$ {}", spec.display()));
        match ctx.runner.run(&spec) {
            Ok(output) => {
                if !output.stdout.trim().is_empty() {
                    ctx.state.push_log(output.stdout.trim_end());
                }
            }
            Err(err) => {
                ctx.state.push_log(format!(
                    "[{}] warning: custom path sync failed: {err}",
                    item.name
                ));
            }
        }
    }

    ctx.state.finish_item(ItemKind::Website, &item.name, Ok(()));
    ctx.state
        .push_log(format!("[{}] website migration completed", item.name));
}
