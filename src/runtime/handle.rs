use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::{
    config::IngestConfig,
    engine::{
        IdentityError, audit,
        audit::IntegrityIssue,
        binder,
        details::{self, PersonDetails},
        import::{self, EventImport, ImportedEvent},
        merge,
        resolve::{self, Resolution},
    },
    ingest::{
        self, IngestError, IngestProgress, MasterListSummary, ReconcileSummary,
        ValidatedCatalogue,
    },
    store::{RecordStore, StoreError},
    types::{Catalogue, Recno},
    upgrade::{self, UpgradeError, UpgradeSummary},
};

use super::events::IdentityEvent;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Upgrade(#[from] UpgradeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("ingest worker failed: {0}")]
    Worker(String),
    #[error("identity service has shut down")]
    ChannelClosed,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub command_queue_bound: usize,
    pub event_buffer: usize,
    pub ingest: IngestConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_queue_bound: 256,
            event_buffer: 1024,
            ingest: IngestConfig::default(),
        }
    }
}

/// Where a Grading List load comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradingSource {
    /// Legacy Grading List, a CSV inside a ZIP archive.
    Zip(PathBuf),
    /// Current Rating List, a plain CSV.
    RatingCsv(PathBuf),
}

pub struct IdentityHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<IdentityEvent>,
    /// One cancel flag per catalogue load that has been requested and not
    /// yet finished.
    ingest_tokens: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
}

impl Clone for IdentityHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
            ingest_tokens: Arc::clone(&self.ingest_tokens),
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, RuntimeError>>;

enum Command {
    ImportEvent {
        import: EventImport,
        resp: Reply<ImportedEvent>,
    },
    DeleteEvent {
        event: Recno,
        resp: Reply<usize>,
    },
    Merge {
        representative: Recno,
        members: Vec<Recno>,
        nested: bool,
        resp: Reply<Vec<Recno>>,
    },
    SplitOne {
        representative: Recno,
        member: Recno,
        resp: Reply<()>,
    },
    DemergeAll {
        representative: Recno,
        resp: Reply<Vec<Recno>>,
    },
    BindMaster {
        representative: Recno,
        code: String,
        resp: Reply<Recno>,
    },
    RegisterNewMaster {
        representative: Recno,
        ecf_name: String,
        resp: Reply<Recno>,
    },
    BindGrading {
        representative: Recno,
        code: String,
        resp: Reply<Recno>,
    },
    Unbind {
        representative: Recno,
        catalogue: Catalogue,
        resp: Reply<()>,
    },
    Resolve {
        alias: Recno,
        resp: Reply<Resolution>,
    },
    Details {
        alias: Recno,
        resp: Reply<PersonDetails>,
    },
    Codes {
        person: Recno,
        resp: Reply<(Option<String>, Option<String>)>,
    },
    Audit {
        resp: Reply<Vec<IntegrityIssue>>,
    },
    LoadGradingList {
        source: GradingSource,
        cancel: Arc<AtomicBool>,
        resp: Reply<ReconcileSummary>,
    },
    ApplyMasterList {
        path: PathBuf,
        load_date: NaiveDate,
        cancel: Arc<AtomicBool>,
        resp: Reply<MasterListSummary>,
    },
    Upgrade {
        resp: Reply<UpgradeSummary>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Starts the loop that owns `store` and serialises every write to it.
pub fn spawn_identity_service<S>(store: S, config: RuntimeConfig) -> IdentityHandle
where
    S: RecordStore + 'static,
{
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<IdentityEvent>(config.event_buffer.max(1));

    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        let mut store = store;
        while let Some(cmd) = cmd_rx.recv().await {
            let done = handle_command(cmd, &mut store, &events_tx_loop, &config).await;
            if done {
                break;
            }
        }
        log::debug!("identity service stopped");
    });

    IdentityHandle {
        cmd_tx,
        events_tx,
        ingest_tokens: Arc::new(Mutex::new(Vec::new())),
    }
}

impl IdentityHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<IdentityEvent> {
        self.events_tx.subscribe()
    }

    /// Asks every catalogue load requested so far, running or queued, to
    /// stop. Each is then refused before anything is written.
    pub fn cancel_ingest(&self) {
        let mut tokens = self
            .ingest_tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for token in tokens.drain(..) {
            token.store(true, Ordering::Relaxed);
        }
    }

    /// Number of catalogue loads requested and not yet finished.
    pub fn pending_loads(&self) -> usize {
        let mut tokens = self
            .ingest_tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tokens.retain(|token| Arc::strong_count(token) > 1);
        tokens.len()
    }

    /// Registers a cancel flag for a load about to be queued.
    fn ingest_token(&self) -> Arc<AtomicBool> {
        let token = Arc::new(AtomicBool::new(false));
        let mut tokens = self
            .ingest_tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tokens.retain(|token| Arc::strong_count(token) > 1);
        tokens.push(Arc::clone(&token));
        token
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    pub async fn import_event(&self, import: EventImport) -> Result<ImportedEvent, RuntimeError> {
        self.request(|resp| Command::ImportEvent { import, resp }).await
    }

    pub async fn delete_event(&self, event: Recno) -> Result<usize, RuntimeError> {
        self.request(|resp| Command::DeleteEvent { event, resp }).await
    }

    pub async fn merge(
        &self,
        representative: Recno,
        members: Vec<Recno>,
    ) -> Result<Vec<Recno>, RuntimeError> {
        self.request(|resp| Command::Merge {
            representative,
            members,
            nested: false,
            resp,
        })
        .await
    }

    pub async fn join(
        &self,
        representative: Recno,
        joins: Vec<Recno>,
    ) -> Result<Vec<Recno>, RuntimeError> {
        self.request(|resp| Command::Merge {
            representative,
            members: joins,
            nested: true,
            resp,
        })
        .await
    }

    pub async fn split_one(&self, representative: Recno, member: Recno) -> Result<(), RuntimeError> {
        self.request(|resp| Command::SplitOne {
            representative,
            member,
            resp,
        })
        .await
    }

    pub async fn demerge_all(&self, representative: Recno) -> Result<Vec<Recno>, RuntimeError> {
        self.request(|resp| Command::DemergeAll {
            representative,
            resp,
        })
        .await
    }

    pub async fn bind_master(
        &self,
        representative: Recno,
        code: impl Into<String>,
    ) -> Result<Recno, RuntimeError> {
        let code = code.into();
        self.request(|resp| Command::BindMaster {
            representative,
            code,
            resp,
        })
        .await
    }

    pub async fn register_new_master(
        &self,
        representative: Recno,
        ecf_name: impl Into<String>,
    ) -> Result<Recno, RuntimeError> {
        let ecf_name = ecf_name.into();
        self.request(|resp| Command::RegisterNewMaster {
            representative,
            ecf_name,
            resp,
        })
        .await
    }

    pub async fn bind_grading(
        &self,
        representative: Recno,
        code: impl Into<String>,
    ) -> Result<Recno, RuntimeError> {
        let code = code.into();
        self.request(|resp| Command::BindGrading {
            representative,
            code,
            resp,
        })
        .await
    }

    pub async fn unbind(&self, representative: Recno, catalogue: Catalogue) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Unbind {
            representative,
            catalogue,
            resp,
        })
        .await
    }

    pub async fn resolve(&self, alias: Recno) -> Result<Resolution, RuntimeError> {
        self.request(|resp| Command::Resolve { alias, resp }).await
    }

    pub async fn person_details(&self, alias: Recno) -> Result<PersonDetails, RuntimeError> {
        self.request(|resp| Command::Details { alias, resp }).await
    }

    /// Master List and Grading List codes bound to `person`.
    pub async fn codes_for_person(
        &self,
        person: Recno,
    ) -> Result<(Option<String>, Option<String>), RuntimeError> {
        self.request(|resp| Command::Codes { person, resp }).await
    }

    pub async fn audit(&self) -> Result<Vec<IntegrityIssue>, RuntimeError> {
        self.request(|resp| Command::Audit { resp }).await
    }

    pub async fn load_grading_list(
        &self,
        source: GradingSource,
    ) -> Result<ReconcileSummary, RuntimeError> {
        let cancel = self.ingest_token();
        self.request(|resp| Command::LoadGradingList {
            source,
            cancel,
            resp,
        })
        .await
    }

    pub async fn apply_master_list(
        &self,
        path: impl Into<PathBuf>,
        load_date: NaiveDate,
    ) -> Result<MasterListSummary, RuntimeError> {
        let path = path.into();
        let cancel = self.ingest_token();
        self.request(|resp| Command::ApplyMasterList {
            path,
            load_date,
            cancel,
            resp,
        })
        .await
    }

    pub async fn upgrade(&self) -> Result<UpgradeSummary, RuntimeError> {
        self.request(|resp| Command::Upgrade { resp }).await
    }

    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

async fn handle_command<S: RecordStore>(
    cmd: Command,
    store: &mut S,
    events_tx: &broadcast::Sender<IdentityEvent>,
    config: &RuntimeConfig,
) -> bool {
    match cmd {
        Command::ImportEvent { import, resp } => {
            let res = import::import_event(store, &import).map_err(RuntimeError::from);
            if let Ok(imported) = &res {
                let _ = events_tx.send(IdentityEvent::EventImported {
                    event: imported.event,
                    aliases: imported.aliases.clone(),
                });
            }
            let _ = resp.send(res);
        }
        Command::DeleteEvent { event, resp } => {
            let res = import::delete_event(store, event).map_err(RuntimeError::from);
            if res.is_ok() {
                let _ = events_tx.send(IdentityEvent::EventDeleted { event });
            }
            let _ = resp.send(res);
        }
        Command::Merge {
            representative,
            members,
            nested,
            resp,
        } => {
            let res = if nested {
                merge::join(store, representative, &members)
            } else {
                merge::merge(store, representative, &members)
            }
            .map_err(RuntimeError::from);
            if let Ok(members) = &res {
                let _ = events_tx.send(IdentityEvent::Merged {
                    representative,
                    members: members.clone(),
                });
            }
            let _ = resp.send(res);
        }
        Command::SplitOne {
            representative,
            member,
            resp,
        } => {
            let res = merge::split_one(store, representative, member).map_err(RuntimeError::from);
            if res.is_ok() {
                let _ = events_tx.send(IdentityEvent::Split {
                    representative,
                    member,
                });
            }
            let _ = resp.send(res);
        }
        Command::DemergeAll {
            representative,
            resp,
        } => {
            let res = merge::demerge_all(store, representative).map_err(RuntimeError::from);
            if let Ok(released) = &res {
                let _ = events_tx.send(IdentityEvent::Demerged {
                    representative,
                    released: released.clone(),
                });
            }
            let _ = resp.send(res);
        }
        Command::BindMaster {
            representative,
            code,
            resp,
        } => {
            let res = binder::bind_master(store, representative, &code).map_err(RuntimeError::from);
            if res.is_ok() {
                let _ = events_tx.send(IdentityEvent::Bound {
                    representative,
                    catalogue: Catalogue::MasterList,
                    code: Some(code.trim().to_string()),
                });
            }
            let _ = resp.send(res);
        }
        Command::RegisterNewMaster {
            representative,
            ecf_name,
            resp,
        } => {
            let res = binder::register_new_master(store, representative, &ecf_name)
                .map_err(RuntimeError::from);
            if res.is_ok() {
                let _ = events_tx.send(IdentityEvent::Bound {
                    representative,
                    catalogue: Catalogue::MasterList,
                    code: None,
                });
            }
            let _ = resp.send(res);
        }
        Command::BindGrading {
            representative,
            code,
            resp,
        } => {
            let res = binder::bind_grading(store, representative, &code).map_err(RuntimeError::from);
            if res.is_ok() {
                let _ = events_tx.send(IdentityEvent::Bound {
                    representative,
                    catalogue: Catalogue::GradingList,
                    code: Some(code.trim().to_string()),
                });
            }
            let _ = resp.send(res);
        }
        Command::Unbind {
            representative,
            catalogue,
            resp,
        } => {
            let res = match catalogue {
                Catalogue::MasterList => binder::unbind_master(store, representative),
                Catalogue::GradingList => binder::unbind_grading(store, representative),
            }
            .map_err(RuntimeError::from);
            if res.is_ok() {
                let _ = events_tx.send(IdentityEvent::Unbound {
                    representative,
                    catalogue,
                });
            }
            let _ = resp.send(res);
        }
        Command::Resolve { alias, resp } => {
            let _ = resp.send(resolve::resolution(store, alias).map_err(RuntimeError::from));
        }
        Command::Details { alias, resp } => {
            let _ = resp.send(details::person_details(store, alias).map_err(RuntimeError::from));
        }
        Command::Codes { person, resp } => {
            let res = binder::master_code_for_person(store, person).and_then(|master| {
                Ok((master, binder::grading_code_for_person(store, person)?))
            });
            let _ = resp.send(res.map_err(RuntimeError::from));
        }
        Command::Audit { resp } => {
            let _ = resp.send(audit::audit(store).map_err(RuntimeError::from));
        }
        Command::LoadGradingList {
            source,
            cancel,
            resp,
        } => {
            let res = match read_on_worker(
                Catalogue::GradingList,
                source,
                events_tx,
                cancel,
                &config.ingest,
            )
            .await
            {
                Ok(load) => ingest::reconcile_grading_list(store, &load).map_err(RuntimeError::from),
                Err(err) => Err(err),
            };
            report_ingest(events_tx, Catalogue::GradingList, res.as_ref().map(|s| s.changed()));
            let _ = resp.send(res);
        }
        Command::ApplyMasterList {
            path,
            load_date,
            cancel,
            resp,
        } => {
            let res = match read_on_worker(
                Catalogue::MasterList,
                path,
                events_tx,
                cancel,
                &config.ingest,
            )
            .await
            {
                Ok(load) => {
                    ingest::apply_master_list(store, &load, load_date).map_err(RuntimeError::from)
                }
                Err(err) => Err(err),
            };
            report_ingest(
                events_tx,
                Catalogue::MasterList,
                res.as_ref()
                    .map(|s| s.refreshed + s.deactivated + s.created > 0),
            );
            if res.is_ok() {
                let _ = events_tx.send(IdentityEvent::MasterListDated { load_date });
            }
            let _ = resp.send(res);
        }
        Command::Upgrade { resp } => {
            let res = upgrade::upgrade_to_active_flags(store).map_err(RuntimeError::from);
            if let Ok(summary) = &res {
                let _ = events_tx.send(IdentityEvent::Upgraded {
                    players: summary.players,
                    clubs: summary.clubs,
                });
            }
            let _ = resp.send(res);
        }
        Command::Shutdown { resp } => {
            let _ = resp.send(());
            return true;
        }
    }

    false
}

/// Sources a catalogue load can be read from on the blocking worker.
trait CatalogueSource: Send + 'static {
    fn read(
        self,
        config: &IngestConfig,
        cancel: &AtomicBool,
        progress: &mut dyn FnMut(IngestProgress),
    ) -> Result<ValidatedCatalogue, IngestError>;
}

impl CatalogueSource for GradingSource {
    fn read(
        self,
        config: &IngestConfig,
        cancel: &AtomicBool,
        progress: &mut dyn FnMut(IngestProgress),
    ) -> Result<ValidatedCatalogue, IngestError> {
        match self {
            Self::Zip(path) => ingest::read_grading_list_zip(path, config, cancel, progress),
            Self::RatingCsv(path) => ingest::read_rating_list_csv(path, config, cancel, progress),
        }
    }
}

impl CatalogueSource for PathBuf {
    fn read(
        self,
        config: &IngestConfig,
        cancel: &AtomicBool,
        progress: &mut dyn FnMut(IngestProgress),
    ) -> Result<ValidatedCatalogue, IngestError> {
        ingest::read_master_list_csv(self, config, cancel, progress)
    }
}

/// Reads and validates a catalogue file off the loop, posting progress.
async fn read_on_worker(
    catalogue: Catalogue,
    source: impl CatalogueSource,
    events_tx: &broadcast::Sender<IdentityEvent>,
    cancel: Arc<AtomicBool>,
    config: &IngestConfig,
) -> Result<ValidatedCatalogue, RuntimeError> {
    let progress_tx = events_tx.clone();
    let config = config.clone();
    tokio::task::spawn_blocking(move || {
        let mut progress = |step: IngestProgress| {
            let _ = progress_tx.send(IdentityEvent::IngestProgress {
                catalogue,
                rows: step.rows,
            });
        };
        source.read(&config, &cancel, &mut progress)
    })
    .await
    .map_err(|e| RuntimeError::Worker(format!("join error: {e}")))?
    .map_err(RuntimeError::from)
}

fn report_ingest(
    events_tx: &broadcast::Sender<IdentityEvent>,
    catalogue: Catalogue,
    outcome: Result<bool, &RuntimeError>,
) {
    let event = match outcome {
        Ok(changed) => IdentityEvent::IngestApplied { catalogue, changed },
        Err(err) => {
            log::warn!("{} load failed: {err}", catalogue.label());
            IdentityEvent::IngestFailed {
                catalogue,
                message: err.to_string(),
            }
        }
    };
    let _ = events_tx.send(event);
}
