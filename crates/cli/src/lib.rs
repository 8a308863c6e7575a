use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pageturn_core::Viewer;
use pageturn_engine::{LoaderRegistry, RenderRequest, Rotation, SharedDocument};
use pageturn_model::{absolute_path, BookmarkChange, ScaleMode};
use pageturn_scheduler::{SearchEvent, SearchRequest, SearchTask};
use pageturn_storage::Storage;
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pageturn")]
#[command(about = "Tabbed PDF viewer without a window")]
pub struct Cli {
    /// Directory holding settings.json, tabs.xml and bookmarks.xml.
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable document metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Open documents into the saved session, reusing tabs that already show them.
    Open {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        page: Option<u32>,
    },
    /// List the tabs of the saved session.
    Tabs,
    /// Close a tab of the saved session.
    Close {
        #[arg(value_name = "INDEX")]
        index: usize,
    },
    /// Manage bookmarks.
    Bookmark {
        #[command(subcommand)]
        command: BookmarkCommand,
    },
    /// Count occurrences of TEXT on every page.
    Search {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(value_name = "TEXT")]
        text: String,
        #[arg(long)]
        match_case: bool,
    },
    /// Render one page to a PNG file.
    Render {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 72.0)]
        dpi: f32,
        /// Clockwise rotation in degrees: 0, 90, 180 or 270.
        #[arg(long, default_value = "0", value_parser = parse_rotation)]
        rotation: Rotation,
        #[arg(long)]
        output: PathBuf,
    },
    /// Read or change a setting.
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Subcommand)]
enum BookmarkCommand {
    /// Bookmark a page of FILE.
    Add {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    List,
    /// Remove every bookmark.
    Clear,
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    /// Print the stored value, or the default when none is stored.
    Get { key: String },
    /// Store VALUE, read as JSON when it parses and as a string otherwise.
    Set { key: String, value: String },
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    first_page_size_pt: Option<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct TabOutput {
    index: usize,
    current: bool,
    file_path: String,
    page_count: u32,
    current_page: u32,
    continuous_mode: bool,
    two_pages_mode: bool,
    scale_mode: ScaleMode,
    scale_factor: f64,
    rotation: u32,
}

#[derive(Debug, Serialize)]
struct BookmarkOutput {
    file_path: String,
    pages: Vec<u32>,
}

#[derive(Debug, Serialize)]
struct SearchOutput {
    matches: Vec<PageMatches>,
    total: usize,
}

#[derive(Debug, Serialize)]
struct PageMatches {
    page: u32,
    count: usize,
}

/// Logs go to stderr so stdout stays machine-readable. `RUST_LOG` overrides
/// the `warn` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let config_dir = cli.config_dir.as_deref();

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Open { files, page } => run_open(config_dir, &files, page),
        Commands::Tabs => {
            let viewer = open_viewer(config_dir)?;
            print_json(&tab_outputs(&viewer))
        }
        Commands::Close { index } => run_close(config_dir, index),
        Commands::Bookmark { command } => run_bookmark(config_dir, command),
        Commands::Search { file, text, match_case } => run_search(&file, &text, match_case),
        Commands::Render { file, page, dpi, rotation, output } => {
            run_render(&file, page, dpi, rotation, &output)
        }
        Commands::Settings { command } => run_settings(config_dir, command),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn storage(config_dir: Option<&Path>) -> Result<Storage> {
    match config_dir {
        Some(dir) => Ok(Storage::with_root(dir)),
        None => Storage::from_env_or_default()
            .context("failed to locate the configuration directory"),
    }
}

fn open_viewer(config_dir: Option<&Path>) -> Result<Viewer> {
    let mut viewer = Viewer::new(storage(config_dir)?);
    viewer.restore_session();
    Ok(viewer)
}

fn save_viewer(viewer: &Viewer) {
    let report = viewer.save_session();
    if report.tabs.is_disabled() {
        tracing::info!("tab restore is off, tabs were not saved");
    }
}

fn run_info(file: &Path) -> Result<()> {
    ensure_file_exists(file)?;

    let document = open_document(file)?;
    let page_count = document.page_count()?;
    let first_page_size_pt = if page_count > 0 {
        let size = document.page_size(0)?;
        Some(PageSizeOutput { width: size.width_pt, height: size.height_pt })
    } else {
        None
    };

    print_json(&InfoOutput { path: file.display().to_string(), page_count, first_page_size_pt })
}

fn run_open(config_dir: Option<&Path>, files: &[PathBuf], page: Option<u32>) -> Result<()> {
    for file in files {
        ensure_file_exists(file)?;
    }

    let mut viewer = open_viewer(config_dir)?;
    for file in files {
        viewer
            .refresh_or_open_in_new_tab(file, page)
            .with_context(|| format!("failed to open {}", file.display()))?;
    }
    save_viewer(&viewer);

    print_json(&tab_outputs(&viewer))
}

fn run_close(config_dir: Option<&Path>, index: usize) -> Result<()> {
    let mut viewer = open_viewer(config_dir)?;
    viewer.close_tab(index).with_context(|| format!("failed to close tab {index}"))?;
    save_viewer(&viewer);

    print_json(&tab_outputs(&viewer))
}

fn run_bookmark(config_dir: Option<&Path>, command: BookmarkCommand) -> Result<()> {
    let mut viewer = open_viewer(config_dir)?;

    match command {
        BookmarkCommand::Add { file, page } => {
            let change = viewer.add_bookmark_for(absolute_path(&file), page);
            save_viewer(&viewer);
            let change = match change {
                BookmarkChange::Created => "created",
                BookmarkChange::PageAppended => "page_appended",
                BookmarkChange::Unchanged => "unchanged",
            };
            print_json(&serde_json::json!({ "change": change }))
        }
        BookmarkCommand::List => {
            let bookmarks: Vec<BookmarkOutput> = viewer
                .bookmarks()
                .iter()
                .map(|bookmark| BookmarkOutput {
                    file_path: bookmark.file_path().display().to_string(),
                    pages: bookmark.pages().to_vec(),
                })
                .collect();
            print_json(&bookmarks)
        }
        BookmarkCommand::Clear => {
            viewer.remove_all_bookmarks();
            save_viewer(&viewer);
            print_json(&serde_json::json!({ "removed": "all" }))
        }
    }
}

fn run_search(file: &Path, text: &str, match_case: bool) -> Result<()> {
    ensure_file_exists(file)?;

    let document = open_document(file)?;
    let task = SearchTask::spawn(document, SearchRequest::new(text).match_case(match_case))
        .context("failed to start search")?;

    let mut matches = Vec::new();
    for event in task.wait() {
        match event {
            SearchEvent::Matches { page, count } => matches.push(PageMatches { page, count }),
            SearchEvent::Failed(reason) => anyhow::bail!("search failed: {reason}"),
            SearchEvent::Progress(_) | SearchEvent::Finished | SearchEvent::Canceled => {}
        }
    }

    let total = matches.iter().map(|hit| hit.count).sum();
    print_json(&SearchOutput { matches, total })
}

fn run_render(file: &Path, page: u32, dpi: f32, rotation: Rotation, output: &Path) -> Result<()> {
    ensure_file_exists(file)?;

    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }
    if !(dpi.is_finite() && dpi > 0.0) {
        anyhow::bail!("--dpi must be a positive number");
    }

    let document = open_document(file)?;
    let request = RenderRequest::page(page - 1).with_dpi(dpi).with_rotation(rotation);
    let image = document.render(&request).context("failed to render page")?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    image
        .save(output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());
    Ok(())
}

fn run_settings(config_dir: Option<&Path>, command: SettingsCommand) -> Result<()> {
    let storage = storage(config_dir)?;
    let mut store = storage.load_settings().context("failed to read settings")?;

    match command {
        SettingsCommand::Get { key } => {
            let value = store.effective(&key).unwrap_or(serde_json::Value::Null);
            print_json(&value)
        }
        SettingsCommand::Set { key, value } => {
            store.set_from_str(key.as_str(), &value);
            storage.save_settings(&store).context("failed to write settings")?;
            print_json(&store.get(&key))
        }
    }
}

fn open_document(file: &Path) -> Result<SharedDocument> {
    LoaderRegistry::default().open(file).context("failed to open document")
}

fn tab_outputs(viewer: &Viewer) -> Vec<TabOutput> {
    let current = viewer.tabs().current_index();

    viewer
        .tabs()
        .iter()
        .enumerate()
        .map(|(index, tab)| {
            let view = tab.view();
            TabOutput {
                index,
                current: current == Some(index),
                file_path: tab.file_path().display().to_string(),
                page_count: tab.page_count(),
                current_page: view.current_page,
                continuous_mode: view.continuous_mode,
                two_pages_mode: view.two_pages_mode,
                scale_mode: view.scale_mode,
                scale_factor: view.scale_factor,
                rotation: view.rotation.degrees(),
            }
        })
        .collect()
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

fn parse_rotation(text: &str) -> Result<Rotation, String> {
    match text {
        "0" => Ok(Rotation::RotateBy0),
        "90" => Ok(Rotation::RotateBy90),
        "180" => Ok(Rotation::RotateBy180),
        "270" => Ok(Rotation::RotateBy270),
        other => Err(format!("rotation must be 0, 90, 180 or 270, got {other}")),
    }
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageturn_storage::PersistOutcome;

    #[test]
    fn rotation_accepts_right_angles_only() {
        assert_eq!(parse_rotation("90"), Ok(Rotation::RotateBy90));
        assert_eq!(parse_rotation("270"), Ok(Rotation::RotateBy270));
        assert!(parse_rotation("45").is_err());
    }

    #[test]
    fn persist_outcome_reaches_the_cli_unchanged() {
        let temp = tempfile::tempdir().expect("tempdir");
        let viewer = open_viewer(Some(temp.path())).expect("viewer");
        let report = viewer.save_session();
        assert!(matches!(report.tabs, PersistOutcome::Disabled));
        assert!(report.settings.is_done());
    }
}
