use std::fs::File;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use simplelog::{Config, LevelFilter, WriteLogger};

use pageturn::progress::ProgressStore;
use pageturn::{
    DirSource, LayoutConfig, NarrationState, NullNarrator, PlainTextPaginator, SessionEngine,
    SessionEvent, SlotOffset,
};

/// Read a directory of plain-text chapters as a paged book.
#[derive(Parser)]
#[command(name = "pageturn", version)]
struct Args {
    /// Directory containing chapter files (.txt/.md, ordered by name)
    book_dir: PathBuf,

    /// Progress file; omit for an ephemeral session
    #[arg(long)]
    progress: Option<PathBuf>,

    /// Page width in characters
    #[arg(long, default_value_t = 72)]
    cols: usize,

    /// Page height in lines
    #[arg(long, default_value_t = 36)]
    rows: usize,

    /// Background load workers
    #[arg(long, default_value_t = 2)]
    workers: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    WriteLogger::init(
        LevelFilter::Debug,
        Config::default(),
        File::create("pageturn.log")?,
    )?;
    info!("Starting pageturn on {}", args.book_dir.display());

    let source = DirSource::open(&args.book_dir)
        .with_context(|| format!("opening book directory {}", args.book_dir.display()))?;
    let book_id = args.book_dir.to_string_lossy().to_string();

    let mut engine = SessionEngine::with_config(
        Arc::new(source),
        Arc::new(PlainTextPaginator),
        Box::new(NullNarrator),
        book_id,
        LayoutConfig {
            max_cols: args.cols,
            rows_per_page: args.rows,
        },
        args.workers.max(1),
        ProgressStore::load_or_ephemeral(args.progress.as_deref()),
    );

    let res = run_loop(&mut engine);
    engine.shutdown();
    info!("Shutting down pageturn");
    res
}

fn run_loop(engine: &mut SessionEngine) -> Result<()> {
    let stdin = std::io::stdin();
    println!("commands: n(ext page) p(rev page) N/P(chapter) g <n> r(eload) q(uit)");
    wait_and_show(engine, vec![]);

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        let events = match parts.next() {
            Some("n") => engine.turn_page_forward(),
            Some("p") => engine.turn_page_backward(),
            Some("N") => engine.navigate_next(),
            Some("P") => engine.navigate_previous(false),
            Some("g") => match parts.next().and_then(|s| s.parse().ok()) {
                Some(index) => engine.jump_to_chapter(index),
                None => {
                    println!("usage: g <chapter>");
                    continue;
                }
            },
            Some("r") => engine.reload_current_chapter(),
            Some("q") => break,
            Some(other) => {
                println!("unknown command: {other}");
                continue;
            }
            None => continue,
        };
        wait_and_show(engine, events);
    }
    Ok(())
}

/// Give in-flight loads a moment to land, then draw the current page.
fn wait_and_show(engine: &mut SessionEngine, mut events: Vec<SessionEvent>) {
    for _ in 0..20 {
        if engine.chapter(SlotOffset::Current).is_some() {
            break;
        }
        events.extend(engine.poll_responses_timeout(Duration::from_millis(100)));
    }
    events.extend(engine.poll_responses());

    for event in &events {
        match event {
            SessionEvent::SessionError { kind, recoverable } => {
                println!("! {kind:?} (recoverable: {recoverable})");
            }
            SessionEvent::NarrationStateChanged(state) => {
                if *state != NarrationState::Stopped {
                    println!("narration: {state:?}");
                }
            }
            _ => {}
        }
    }

    match engine.current_chapter() {
        Some(chapter) => {
            println!(
                "--- {} [{}/{}] page {}/{} ---",
                chapter.title(),
                engine.chapter_index() + 1,
                engine.total_chapters(),
                engine.page_index() + 1,
                chapter.page_count(),
            );
            println!("{}", engine.current_page_text().unwrap_or(""));
        }
        None => println!("(chapter still loading)"),
    }
    let _ = std::io::stdout().flush();
}
