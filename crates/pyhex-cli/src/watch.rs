//! `pyhex generate --watch`: regenerate when configuration or templates change.

// Internal imports (std, crate)
use std::path::{Path, PathBuf};
use std::time::Duration;

// External imports (alphabetized)
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use pyhex_core::{config::Config, GenerateOptions};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Quiet period collecting the burst of events of one save
const DEBOUNCE: Duration = Duration::from_millis(300);

/// Whether a changed file is an input of generation
pub(crate) fn is_watched_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml" | "tera")
    )
}

pub(crate) async fn watch(
    root: PathBuf,
    config: Config,
    template_dir: Option<PathBuf>,
    domains: Vec<String>,
    options: GenerateOptions,
) -> anyhow::Result<()> {
    if let Err(e) =
        crate::generate_once(&root, &config, template_dir.clone(), &domains, &options, false).await
    {
        error!("{e:#}");
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                ) {
                    for path in event.paths.into_iter().filter(|p| is_watched_file(p)) {
                        let _ = tx.send(path);
                    }
                }
            }
            Err(e) => warn!("watch error: {e}"),
        },
        notify::Config::default(),
    )?;

    let mut watched = vec![config.domains_path(&root)];
    if let Some(dir) = template_dir
        .clone()
        .or_else(|| config.template_dir.as_ref().map(|d| root.join(d)))
    {
        watched.push(dir);
    }
    for dir in &watched {
        watcher.watch(dir, RecursiveMode::Recursive)?;
        info!("Watching {}", dir.display());
    }
    info!("Press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.recv() => {
                let Some(first) = changed else { break };
                tokio::time::sleep(DEBOUNCE).await;
                let mut paths = vec![first];
                while let Ok(path) = rx.try_recv() {
                    if !paths.contains(&path) {
                        paths.push(path);
                    }
                }
                for path in &paths {
                    info!("Changed: {}", path.strip_prefix(&root).unwrap_or(path).display());
                }
                // Templates are re-read on every run so edited overrides apply
                if let Err(e) =
                    crate::generate_once(&root, &config, template_dir.clone(), &domains, &options, false).await
                {
                    error!("{e:#}");
                }
            }
        }
    }

    info!("Stopped watching");
    Ok(())
}
