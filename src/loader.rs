//! Asynchronous book loading.
//!
//! [`PageLoader`] drives one book through
//! `Idle → Parsing → {Ready, ParseError}`. Opening the archive, resolving
//! the encoding and building the chapter table run on tokio's blocking
//! pool. Outcomes come back over a channel and are applied, with listener
//! callbacks, only when the owner calls [`PageLoader::dispatch_pending`] or
//! [`PageLoader::dispatch_next`]. The owner's context is the only place
//! state changes and callbacks happen.
//!
//! Every load is tagged with a generation. Closing the book bumps the
//! generation and raises the in-flight job's cancel flag, so nothing that
//! was pending at close time ever reaches the listener.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use encoding_rs::Encoding;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::chapters::{
    ChapterEntry, ChapterTable, DEFAULT_LEAD_UNIT_LABEL, build_chapter_table_cancellable,
};
use crate::encoding::resolve_encoding;
use crate::epub::{Document, PackageMetadata};
use crate::error::{BuildError, ExtractError, ParseErrorKind};
use crate::extract::{TextFormatter, WebTextFormatter, extract_chapter_text};
use crate::record::{ReadingPosition, SharedRecord};
use crate::util::time_now_millis;

/// Load state of a [`PageLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// No book loaded, or the book was closed.
    #[default]
    Idle,
    /// A load is in flight.
    Parsing,
    /// The chapter table is available.
    Ready,
    /// The last load failed.
    ParseError,
}

/// Receives load outcomes. Called only from the loader owner's context.
pub trait PageListener {
    /// The chapter table is ready. Called after [`Self::skip_to_chapter`].
    fn on_chapter_table_ready(&mut self, table: &ChapterTable);

    /// The load failed. No chapter table is available.
    fn on_parse_error(&mut self, kind: ParseErrorKind);

    /// Resume reading where the record says the reader left off.
    fn skip_to_chapter(&mut self, position: ReadingPosition);
}

/// Loader configuration.
#[derive(Clone)]
pub struct LoaderOptions {
    lead_unit_label: String,
    formatter: Arc<dyn TextFormatter>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            lead_unit_label: DEFAULT_LEAD_UNIT_LABEL.to_string(),
            formatter: Arc::new(WebTextFormatter),
        }
    }
}

impl LoaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Title given to chapter 0.
    pub fn lead_unit_label(mut self, label: impl Into<String>) -> Self {
        self.lead_unit_label = label.into();
        self
    }

    /// Normalization applied to every extracted text run.
    pub fn formatter(mut self, formatter: Arc<dyn TextFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn lead_label(&self) -> &str {
        &self.lead_unit_label
    }
}

impl std::fmt::Debug for LoaderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("lead_unit_label", &self.lead_unit_label)
            .finish_non_exhaustive()
    }
}

/// The open document and its resolved encoding.
struct Session {
    document: Arc<Document>,
    encoding: &'static Encoding,
}

/// Outcome of one load job, tagged with the generation that started it.
struct Delivery {
    generation: u64,
    outcome: Result<Arc<ChapterTable>, ParseErrorKind>,
}

/// Loads one book and serves its chapters.
///
/// Dropping the loader closes the book.
pub struct PageLoader {
    path: PathBuf,
    record: SharedRecord,
    listener: Box<dyn PageListener>,
    options: LoaderOptions,
    runtime: Handle,

    state: LoadState,
    chapter_table: Option<Arc<ChapterTable>>,
    session: Arc<Mutex<Option<Session>>>,

    generation: u64,
    in_flight: Option<Arc<AtomicBool>>,
    tx: UnboundedSender<Delivery>,
    rx: UnboundedReceiver<Delivery>,
}

impl PageLoader {
    /// Create a loader that schedules work on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime. Use
    /// [`PageLoader::with_handle`] to pass one explicitly.
    pub fn new(
        path: impl Into<PathBuf>,
        record: SharedRecord,
        listener: Box<dyn PageListener>,
        options: LoaderOptions,
    ) -> Self {
        Self::with_handle(path, record, listener, options, Handle::current())
    }

    pub fn with_handle(
        path: impl Into<PathBuf>,
        record: SharedRecord,
        listener: Box<dyn PageListener>,
        options: LoaderOptions,
        runtime: Handle,
    ) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            path: path.into(),
            record,
            listener,
            options,
            runtime,
            state: LoadState::Idle,
            chapter_table: None,
            session: Arc::new(Mutex::new(None)),
            generation: 0,
            in_flight: None,
            tx,
            rx,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// The chapter table, once [`LoadState::Ready`].
    pub fn chapter_table(&self) -> Option<&Arc<ChapterTable>> {
        self.chapter_table.as_ref()
    }

    /// Package metadata of the open document.
    pub fn metadata(&self) -> Option<PackageMetadata> {
        self.session
            .lock()
            .as_ref()
            .map(|session| session.document.metadata().clone())
    }

    /// Encoding the open document is decoded with.
    pub fn encoding(&self) -> Option<&'static Encoding> {
        self.session.lock().as_ref().map(|session| session.encoding)
    }

    /// Start loading the chapter table in the background.
    ///
    /// While a load is already in flight the request is folded into it.
    pub fn refresh_chapter_list(&mut self) {
        if self.state == LoadState::Parsing {
            debug!("refresh of {} coalesced into the running load", self.path.display());
            return;
        }

        self.generation += 1;
        let cancel = Arc::new(AtomicBool::new(false));
        self.in_flight = Some(Arc::clone(&cancel));
        self.state = LoadState::Parsing;
        self.chapter_table = None;

        let job = LoadJob {
            path: self.path.clone(),
            record: Arc::clone(&self.record),
            session: Arc::clone(&self.session),
            lead_unit_label: self.options.lead_unit_label.clone(),
            cancel: Arc::clone(&cancel),
        };
        let generation = self.generation;
        let tx = self.tx.clone();
        let runtime = self.runtime.clone();

        self.runtime.spawn(async move {
            let outcome = match runtime.spawn_blocking(move || job.run()).await {
                Ok(Some(outcome)) => outcome,
                Ok(None) => return,
                Err(e) => {
                    error!("load worker failed: {e}");
                    Err(ParseErrorKind::Worker)
                }
            };
            if cancel.load(Ordering::Acquire) {
                return;
            }
            // The loader may be gone; then nobody is listening.
            let _ = tx.send(Delivery {
                generation,
                outcome,
            });
        });
    }

    /// Apply every outcome that has already arrived, without waiting.
    ///
    /// Returns the number of state transitions applied.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(delivery) = self.rx.try_recv() {
            if self.deliver(delivery) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the in-flight load and apply its outcome.
    ///
    /// Returns `false` at once when no load is in flight.
    pub async fn dispatch_next(&mut self) -> bool {
        while self.state == LoadState::Parsing {
            let Some(delivery) = self.rx.recv().await else {
                return false;
            };
            if self.deliver(delivery) {
                return true;
            }
        }
        false
    }

    fn deliver(&mut self, delivery: Delivery) -> bool {
        if delivery.generation != self.generation || self.state != LoadState::Parsing {
            debug!("dropping stale delivery (generation {})", delivery.generation);
            return false;
        }
        self.in_flight = None;

        match delivery.outcome {
            Ok(table) => {
                self.state = LoadState::Ready;
                self.chapter_table = Some(Arc::clone(&table));
                let position = self.record.lock().reading_position();
                self.listener.skip_to_chapter(position);
                self.listener.on_chapter_table_ready(&table);
            }
            Err(kind) => {
                self.state = LoadState::ParseError;
                self.chapter_table = None;
                self.listener.on_parse_error(kind);
            }
        }
        true
    }

    /// Extract the text of one chapter on the worker pool.
    ///
    /// Fails with [`ExtractError::NotReady`] unless the loader is
    /// [`LoadState::Ready`], and with [`ExtractError::Closed`] when the book
    /// is closed before the text is ready. The returned future does not
    /// borrow the loader.
    pub fn chapter_content(
        &self,
        entry: &ChapterEntry,
    ) -> impl Future<Output = Result<String, ExtractError>> + Send + 'static + use<> {
        let prepared = if self.state == LoadState::Ready {
            self.session
                .lock()
                .as_ref()
                .map(|session| (Arc::clone(&session.document), session.encoding))
                .ok_or(ExtractError::Closed)
        } else {
            Err(ExtractError::NotReady)
        };
        let session = Arc::clone(&self.session);
        let formatter = Arc::clone(&self.options.formatter);
        let runtime = self.runtime.clone();
        let index = entry.index;

        async move {
            let (document, encoding) = prepared?;

            let worker_document = Arc::clone(&document);
            let text = runtime
                .spawn_blocking(move || {
                    let unit = worker_document.unit(index)?;
                    extract_chapter_text(&unit, encoding, formatter.as_ref())
                })
                .await
                .map_err(|e| ExtractError::Worker(e.to_string()))??;

            let still_open = session
                .lock()
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(&current.document, &document));
            if still_open {
                Ok(text)
            } else {
                Err(ExtractError::Closed)
            }
        }
    }

    /// Cancel any in-flight load, release the document and return to
    /// [`LoadState::Idle`]. Safe to call repeatedly.
    pub fn close_book(&mut self) {
        if let Some(cancel) = self.in_flight.take() {
            cancel.store(true, Ordering::Release);
        }
        self.generation += 1;
        while self.rx.try_recv().is_ok() {}

        if self.session.lock().take().is_some() {
            info!("closed {}", self.path.display());
        }
        self.chapter_table = None;
        self.state = LoadState::Idle;
    }
}

impl Drop for PageLoader {
    fn drop(&mut self) {
        self.close_book();
    }
}

impl std::fmt::Debug for PageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageLoader")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Worker half of one load.
struct LoadJob {
    path: PathBuf,
    record: SharedRecord,
    session: Arc<Mutex<Option<Session>>>,
    lead_unit_label: String,
    cancel: Arc<AtomicBool>,
}

impl LoadJob {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Run the load. `None` means the job was cancelled and must stay
    /// silent.
    fn run(self) -> Option<Result<Arc<ChapterTable>, ParseErrorKind>> {
        // 1. Reuse the open document or open it
        let open = self
            .session
            .lock()
            .as_ref()
            .map(|session| Arc::clone(&session.document));
        let document = match open {
            Some(document) => document,
            None => match Document::open(&self.path) {
                Ok(document) => Arc::new(document),
                Err(e) => {
                    if self.cancelled() {
                        return None;
                    }
                    error!("cannot open {}: {e}", self.path.display());
                    return Some(Err(ParseErrorKind::from(&e)));
                }
            },
        };
        if self.cancelled() {
            return None;
        }

        // 2. Encoding: remembered by the record, or resolved once and remembered
        let encoding = self.encoding(&document);

        {
            let mut session = self.session.lock();
            // Checked under the lock so a concurrent close cannot miss it.
            if self.cancelled() {
                return None;
            }
            *session = Some(Session {
                document: Arc::clone(&document),
                encoding,
            });
        }

        // 3. Reuse the stored table unless a refresh was requested
        let stored = {
            let record = self.record.lock();
            if record.has_non_empty_chapter_table() && !record.needs_refresh() {
                record.chapter_table()
            } else {
                None
            }
        };
        if let Some(table) = stored {
            info!("reusing stored chapter table ({} entries)", table.len());
            return Some(Ok(Arc::new(table)));
        }

        let table =
            match build_chapter_table_cancellable(&document, encoding, &self.lead_unit_label, &self.cancel)
            {
                Ok(table) => table,
                Err(BuildError::Cancelled) => return None,
                Err(BuildError::Empty) => {
                    error!("{} has no chapters", self.path.display());
                    return Some(Err(ParseErrorKind::Empty));
                }
            };

        if !self.store(&table) {
            return None;
        }
        Some(Ok(Arc::new(table)))
    }

    /// Save a freshly built table on the record.
    ///
    /// Returns `false` without touching the record when the job was
    /// cancelled, even if the cancel landed after the last unit was read.
    fn store(&self, table: &ChapterTable) -> bool {
        let mut record = self.record.lock();
        if self.cancelled() {
            return false;
        }
        record.set_chapter_table(table.clone());
        record.clear_refresh_flag();
        if record.is_tracked() {
            record.persist(table, time_now_millis());
        }
        true
    }

    fn encoding(&self, document: &Document) -> &'static Encoding {
        let persisted = self.record.lock().persisted_encoding();
        if let Some(label) = persisted {
            match Encoding::for_label(label.trim().as_bytes()) {
                Some(encoding) => return encoding,
                None => warn!("unknown persisted encoding {label:?}, detecting again"),
            }
        }

        let encoding = resolve_encoding(document);
        info!("detected {} for {}", encoding.name(), self.path.display());
        self.record.lock().set_persisted_encoding(encoding.name());
        encoding
    }
}
