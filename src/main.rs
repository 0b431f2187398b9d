//! folio - EPUB chapter loader

use std::cell::RefCell;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;

use folio::{
    ChapterTable, LoadState, LoaderOptions, MemoryBookRecord, PageListener, PageLoader,
    ParseErrorKind, ReadingPosition,
};

#[derive(Parser)]
#[command(name = "folio")]
#[command(version, about = "Load an EPUB's chapter table and chapter text", long_about = None)]
#[command(after_help = "EXAMPLES:
    folio book.epub               List chapters
    folio book.epub --json        List chapters as JSON
    folio book.epub -c 3          Print the text of chapter 3")]
struct Cli {
    /// EPUB file to load
    #[arg(value_name = "FILE")]
    file: String,

    /// Print the text of this chapter instead of the chapter list
    #[arg(short, long, value_name = "N")]
    chapter: Option<usize>,

    /// Print the chapter table as JSON
    #[arg(long)]
    json: bool,

    /// Title of chapter 0
    #[arg(long, value_name = "LABEL", default_value = "Cover")]
    cover_label: String,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// What the loader reported.
#[derive(Default)]
struct Report {
    resume_at: Option<ReadingPosition>,
    error: Option<ParseErrorKind>,
}

struct ConsoleListener {
    report: Rc<RefCell<Report>>,
}

impl PageListener for ConsoleListener {
    fn on_chapter_table_ready(&mut self, table: &ChapterTable) {
        log::info!("chapter table ready ({} entries)", table.len());
    }

    fn on_parse_error(&mut self, kind: ParseErrorKind) {
        self.report.borrow_mut().error = Some(kind);
    }

    fn skip_to_chapter(&mut self, position: ReadingPosition) {
        self.report.borrow_mut().resume_at = Some(position);
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let runtime = tokio::runtime::Runtime::new().map_err(|e| e.to_string())?;
    runtime.block_on(load(cli))
}

async fn load(cli: &Cli) -> Result<(), String> {
    let (_, record) = MemoryBookRecord::new().shared();
    let report = Rc::new(RefCell::new(Report::default()));
    let listener = ConsoleListener {
        report: Rc::clone(&report),
    };
    let options = LoaderOptions::new().lead_unit_label(cli.cover_label.as_str());

    let mut loader = PageLoader::new(&cli.file, record, Box::new(listener), options);
    loader.refresh_chapter_list();
    loader.dispatch_next().await;

    if loader.state() != LoadState::Ready {
        let kind = report.borrow().error.unwrap_or(ParseErrorKind::Worker);
        return Err(format!("{}: {kind}", cli.file));
    }
    let table = loader
        .chapter_table()
        .cloned()
        .ok_or_else(|| "chapter table missing".to_string())?;

    if let Some(index) = cli.chapter {
        let entry = table
            .get(index)
            .ok_or_else(|| format!("no chapter {index} (book has {})", table.len()))?;
        let text = loader
            .chapter_content(entry)
            .await
            .map_err(|e| e.to_string())?;
        println!("{text}");
        return Ok(());
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&*table).map_err(|e| e.to_string())?;
        println!("{json}");
        return Ok(());
    }

    if let Some(meta) = loader.metadata() {
        println!("File: {}", cli.file);
        if !meta.title.is_empty() {
            println!("Title: {}", meta.title);
        }
        if !meta.authors.is_empty() {
            println!("Authors: {}", meta.authors.join(", "));
        }
    }
    if let Some(encoding) = loader.encoding() {
        println!("Encoding: {}", encoding.name());
    }
    if let Some(position) = report.borrow().resume_at {
        println!("Resume at: chapter {}, page {}", position.chapter, position.page);
    }
    println!("Chapters: {}", table.len());
    for entry in table.iter() {
        println!("{:>4}  {:<40}  {}", entry.index, entry.title, entry.source_ref);
    }

    Ok(())
}
