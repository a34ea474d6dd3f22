use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use relative_path::RelativePathBuf;
use specmark_config::Config;
use specmark_engine::render::RenderTree;
use specmark_engine::selection::{
    CapturedSelection, LayoutProvider, Point, Rect, SelectionCapture, SelectionConfig,
    SelectionRange, TextPosition,
};
use specmark_engine::{
    CommentId, CommentStatus, CommentStore, CommentUpdate, DocumentSession, DocumentStore,
    FsStore, HighlightConfig, HighlightInjector, SaveOutcome, StoreError,
    create_anchor_from_selection, render_markdown, to_html,
};
use std::io::Read;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "specmark")]
#[command(about = "Read, write and comment on Markdown spec documents")]
struct Cli {
    /// Documents folder; overrides `docs_path` from the config file
    #[arg(long, global = true)]
    docs: Option<PathBuf>,
    /// Print machine-readable JSON where supported
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the Markdown documents under the documents folder
    List,
    /// Print a document
    Read { path: RelativePathBuf },
    /// Replace a document's content, refusing if it changed since it was read
    Write {
        path: RelativePathBuf,
        /// File to read the new content from; stdin when omitted
        #[arg(long)]
        from: Option<PathBuf>,
        /// Modification time (epoch ms) seen when the document was read
        #[arg(long)]
        expected_mtime: Option<i64>,
        /// Overwrite even if the document changed
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Render a document to HTML with comment highlights
    Render { path: RelativePathBuf },
    /// Re-anchor a document's comments after it was edited elsewhere
    Relocate { path: RelativePathBuf },
    Comments {
        #[command(subcommand)]
        command: CommentsCommand,
    },
}

#[derive(Subcommand)]
enum CommentsCommand {
    /// Show comment threads for a document
    List { path: RelativePathBuf },
    /// Comment on a piece of text
    Add {
        path: RelativePathBuf,
        /// Line the text starts on (1-based)
        #[arg(long)]
        line: usize,
        /// Line the text ends on; defaults to --line
        #[arg(long)]
        end_line: Option<usize>,
        /// The exact text being commented on
        #[arg(long)]
        text: String,
        #[arg(long)]
        body: String,
        #[arg(long)]
        author: Option<String>,
    },
    Reply {
        path: RelativePathBuf,
        id: CommentId,
        #[arg(long)]
        body: String,
        #[arg(long)]
        author: Option<String>,
    },
    Update {
        path: RelativePathBuf,
        id: CommentId,
        #[arg(long)]
        body: Option<String>,
        /// open, resolved or archived
        #[arg(long)]
        status: Option<CommentStatus>,
    },
    /// Delete a comment and its replies
    Delete { path: RelativePathBuf, id: CommentId },
}

struct App {
    store: FsStore,
    config: Option<Config>,
    json: bool,
}

impl App {
    fn author(&self, explicit: Option<String>) -> String {
        explicit
            .or_else(|| self.config.as_ref().and_then(|c| c.author.clone()))
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "anonymous".to_string())
    }

    fn highlight_config(&self) -> HighlightConfig {
        match &self.config {
            Some(config) => HighlightConfig {
                debounce: config.highlight.debounce(),
                settle: config.highlight.settle(),
            },
            None => HighlightConfig::default(),
        }
    }

    fn selection_config(&self) -> SelectionConfig {
        match &self.config {
            Some(config) => SelectionConfig {
                clear_native_delay: config.selection.clear_native_delay(),
            },
            None => SelectionConfig::default(),
        }
    }
}

/// No geometry without a display.
struct Headless;

impl LayoutProvider for Headless {
    fn client_rects(&self, _tree: &RenderTree, _range: &SelectionRange) -> Vec<Rect> {
        Vec::new()
    }
}

/// Where `text` shows in the rendered block covering `line`, as a selection.
fn find_in_block(tree: &RenderTree, text: &str, line: usize) -> Option<SelectionRange> {
    tree.text_nodes(tree.root()).into_iter().find_map(|node| {
        let block = tree
            .ancestors(node)
            .find_map(|id| tree.element(id).and_then(|e| e.lines))?;
        if !(block.start..=block.end).contains(&line) {
            return None;
        }
        let offset = tree.text(node)?.find(text)?;
        Some(SelectionRange::new(
            TextPosition::new(node, offset),
            TextPosition::new(node, offset + text.len()),
        ))
    })
}

/// Select `text` in the rendered document the way a reader would; text
/// that crosses inline markup falls back to the given lines.
fn capture_selection(
    content: &str,
    text: String,
    line: usize,
    end_line: usize,
    config: SelectionConfig,
) -> CapturedSelection {
    let tree = render_markdown(content);
    let mut capture = SelectionCapture::new(tree.root(), config);
    if let Some(range) = find_in_block(&tree, &text, line)
        && let Some(captured) =
            capture.on_pointer_up(&tree, Some(&range), Point::default(), &Headless, Instant::now())
    {
        return captured.clone();
    }

    log::debug!("{text:?} not found as one run of rendered text on line {line}");
    CapturedSelection {
        text,
        start_line: line,
        end_line: end_line.max(line),
        rects: Vec::new(),
        pointer: Point::default(),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let config_path = Config::config_path();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) if cli.docs.is_some() => {
            log::warn!("ignoring unreadable config file: {e}");
            None
        }
        Err(e) => return Err(e).context("failed to load config file"),
    };

    let docs_path = match (&cli.docs, &config) {
        (Some(docs), _) => docs.clone(),
        (None, Some(config)) => config.docs_path.clone(),
        (None, None) => {
            eprintln!("Error: No documents folder given and no config file found");
            eprintln!("Use --docs <folder> or create {}", config_path.display());
            process::exit(1);
        }
    };

    let store = match FsStore::open(&docs_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!(
                "Error: Documents folder '{}' is invalid: {e}",
                docs_path.display()
            );
            process::exit(1);
        }
    };

    let app = App {
        store,
        config,
        json: cli.json,
    };

    match run(&app, cli.command) {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast_ref::<StoreError>() {
            Some(store_error) => {
                eprintln!("[{}] {}", store_error.code(), store_error.user_message());
                let code = if store_error.conflict().is_some() { 2 } else { 1 };
                process::exit(code);
            }
            None => Err(e),
        },
    }
}

fn run(app: &App, command: Command) -> Result<()> {
    match command {
        Command::List => list_documents(app),
        Command::Read { path } => read_document(app, path),
        Command::Write {
            path,
            from,
            expected_mtime,
            force,
        } => write_document(app, path, from, expected_mtime, force),
        Command::Render { path } => render_document(app, path),
        Command::Relocate { path } => relocate(app, path),
        Command::Comments { command } => run_comments(app, command),
    }
}

fn list_documents(app: &App) -> Result<()> {
    let documents = app.store.list_documents()?;
    if app.json {
        println!("{}", serde_json::to_string_pretty(&documents)?);
        return Ok(());
    }
    for document in documents {
        println!("{}\t{}", document.last_modified(), document.relative_path());
    }
    Ok(())
}

fn read_document(app: &App, path: RelativePathBuf) -> Result<()> {
    let snapshot = app.store.read_document(&path)?;
    if app.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        eprintln!("mtime: {}", snapshot.last_modified);
        print!("{}", snapshot.content);
    }
    Ok(())
}

fn write_document(
    app: &App,
    path: RelativePathBuf,
    from: Option<PathBuf>,
    expected_mtime: Option<i64>,
    force: bool,
) -> Result<()> {
    let content = match from {
        Some(file) => std::fs::read_to_string(&file)
            .with_context(|| format!("failed to read {}", file.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read content from stdin")?;
            buffer
        }
    };

    let mut session = DocumentSession::open(&app.store, &path)?;
    let mut request = session.save_request(content, force);
    if expected_mtime.is_some() {
        request.expected_mtime = expected_mtime;
    }
    let result = request.execute(&app.store);

    match session.complete_save(&app.store, &request, result)? {
        SaveOutcome::Saved {
            last_modified,
            relocation,
        } => {
            println!("saved {path} (mtime {last_modified})");
            if !relocation.is_empty() {
                println!(
                    "comments: {} moved, {} lost, {} found again",
                    relocation.moved.len(),
                    relocation.orphaned.len(),
                    relocation.restored.len()
                );
            }
            Ok(())
        }
        SaveOutcome::Conflict(conflict) => Err(StoreError::Conflict(conflict).into()),
        SaveOutcome::Stale => bail!("save result arrived after the document was reloaded"),
    }
}

fn render_document(app: &App, path: RelativePathBuf) -> Result<()> {
    let snapshot = app.store.read_document(&path)?;
    let comments = app.store.list_comments(&path)?;

    let mut tree = render_markdown(&snapshot.content);
    let mut injector = HighlightInjector::new(tree.root(), app.highlight_config());
    let report = injector.inject(&mut tree, &comments, Instant::now());
    if !report.unlocated.is_empty() {
        log::info!(
            "{} comment(s) could not be placed in the rendered document",
            report.unlocated.len()
        );
    }

    println!("{}", to_html(&tree));
    Ok(())
}

fn relocate(app: &App, path: RelativePathBuf) -> Result<()> {
    let mut session = DocumentSession::open(&app.store, &path)?;
    let summary = session.relocate_comments(&app.store)?;
    println!(
        "{} moved, {} lost, {} found again",
        summary.moved.len(),
        summary.orphaned.len(),
        summary.restored.len()
    );
    Ok(())
}

fn run_comments(app: &App, command: CommentsCommand) -> Result<()> {
    match command {
        CommentsCommand::List { path } => {
            let session = DocumentSession::open(&app.store, &path)?;
            if app.json {
                println!("{}", serde_json::to_string_pretty(session.comments())?);
                return Ok(());
            }
            for thread in session.threads() {
                let c = &thread.comment;
                let lost = if c.anchor_lost { " (anchor lost)" } else { "" };
                println!(
                    "{} [{}] L{}-{}{} {}: {}",
                    c.id,
                    c.status,
                    c.anchor.start_line(),
                    c.anchor.end_line(),
                    lost,
                    c.author,
                    c.content
                );
                for reply in &thread.replies {
                    println!("    {} {}: {}", reply.id, reply.author, reply.content);
                }
            }
            Ok(())
        }
        CommentsCommand::Add {
            path,
            line,
            end_line,
            text,
            body,
            author,
        } => {
            let mut session = DocumentSession::open(&app.store, &path)?;
            let selection = capture_selection(
                session.content(),
                text,
                line,
                end_line.unwrap_or(line),
                app.selection_config(),
            );
            let Some(anchor) = create_anchor_from_selection(session.content(), Some(&selection))
            else {
                bail!("--text must not be empty and --line must be at least 1");
            };
            let comment = session.add_comment(&app.store, anchor, body, app.author(author))?;
            println!("{}", comment.id);
            Ok(())
        }
        CommentsCommand::Reply {
            path,
            id,
            body,
            author,
        } => {
            let mut session = DocumentSession::open(&app.store, &path)?;
            let comment = session.reply(&app.store, id, body, app.author(author))?;
            println!("{}", comment.id);
            Ok(())
        }
        CommentsCommand::Update {
            path,
            id,
            body,
            status,
        } => {
            let update = CommentUpdate {
                content: body,
                status,
            };
            if update.is_empty() {
                bail!("nothing to update: pass --body and/or --status");
            }
            let mut session = DocumentSession::open(&app.store, &path)?;
            session.update_comment(&app.store, id, &update)?;
            Ok(())
        }
        CommentsCommand::Delete { path, id } => {
            let mut session = DocumentSession::open(&app.store, &path)?;
            let removed = session.delete_comment(&app.store, id)?;
            println!("deleted {} comment(s)", removed.len());
            Ok(())
        }
    }
}
