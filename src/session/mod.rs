//! # Session I/O Orchestrator
//!
//! A [`Session`] owns the live [`Game`] on the foreground and runs at most one save or
//! load at a time on a blocking worker.
//!
//! ```text
//!             begin_save / begin_load
//!   Idle ───────────────────────────────▶ SavingOrLoading(op)
//!    ▲                                          │
//!    └──────── poll() / wait() ◀── worker done ─┘
//! ```
//!
//! - Save encodes the tree on the foreground (the live graph is only read), then the
//!   worker serializes, transforms and writes it.
//! - Load captures a [`BehaviorCatalog`] from the live graph on the foreground. The
//!   worker reads and verifies the slot, rebuilds the world from a reset
//!   [`ConstructionContext`], decodes the snapshot into it and reattaches behaviors. The
//!   finished graph is swapped in by `poll`/`wait`, which run on the foreground, so no
//!   foreground read can observe a half-installed graph.
//! - A second request while an operation is outstanding is rejected with
//!   [`FictionError::Busy`] and a [`HostSignal::Rejected`].
//!
//! Every finished operation, successful or not, produces a
//! [`HostSignal::OperationCompleted`] carrying a human-readable message.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::fiction::errors::{FictionError, IoOperation};
use crate::fiction::game::{EndReason, Game};
use crate::fiction::identity::ConstructionContext;
use crate::fiction::reattach::{BehaviorCatalog, ReattachReport};
use crate::fiction::snapshot;
use crate::logutil::escape_log;
use crate::metrics;
use crate::storage::transform::{ByteTransform, Identity};
use crate::storage::{checked_slot, pack, unpack, SlotStore, SnapshotFormat};

/// Host function that builds a fresh world. Called with a freshly reset context.
pub type WorldBuilder = Arc<dyn Fn(&mut ConstructionContext) -> Game + Send + Sync>;

/// Notifications for the host UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSignal {
    /// The live graph changed; re-render.
    FrameUpdated,
    GameEnded(EndReason),
    OperationCompleted {
        operation: IoOperation,
        success: bool,
        message: String,
    },
    Rejected {
        requested: SessionRequest,
        in_flight: IoOperation,
        message: String,
    },
}

/// Something the host asked the session to do that needs it to be idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRequest {
    Save,
    Load,
    NewGame,
}

impl From<IoOperation> for SessionRequest {
    fn from(op: IoOperation) -> Self {
        match op {
            IoOperation::Save => SessionRequest::Save,
            IoOperation::Load => SessionRequest::Load,
        }
    }
}

impl std::fmt::Display for SessionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionRequest::Save => write!(f, "save"),
            SessionRequest::Load => write!(f, "load"),
            SessionRequest::NewGame => write!(f, "start a new game"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    SavingOrLoading(IoOperation),
}

/// Result of one finished save or load, as returned by [`Session::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub operation: IoOperation,
    pub slot: String,
    pub success: bool,
    pub message: String,
}

enum WorkerOutcome {
    Saved {
        bytes: usize,
    },
    Loaded {
        game: Box<Game>,
        ctx: ConstructionContext,
        report: ReattachReport,
        snapshot_id: Uuid,
    },
}

struct PendingOp {
    operation: IoOperation,
    slot: String,
    rx: oneshot::Receiver<Result<WorkerOutcome, FictionError>>,
}

pub struct Session {
    game: Game,
    ctx: ConstructionContext,
    builder: WorldBuilder,
    store: Arc<dyn SlotStore>,
    transform: Arc<dyn ByteTransform>,
    format: SnapshotFormat,
    runtime: Handle,
    signals: mpsc::UnboundedSender<HostSignal>,
    pending: Option<PendingOp>,
    end_signaled: bool,
}

impl Session {
    /// Build the first world and return the session with its signal receiver.
    /// Must be called from inside a tokio runtime.
    pub fn new(
        builder: WorldBuilder,
        store: Arc<dyn SlotStore>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<HostSignal>), FictionError> {
        let runtime = Handle::try_current()
            .map_err(|e| FictionError::Internal(format!("no tokio runtime: {}", e)))?;
        let (signals, rx) = mpsc::unbounded_channel();
        let mut ctx = ConstructionContext::new();
        ctx.reset_session_ids();
        let game = builder(&mut ctx);
        let session = Self {
            game,
            ctx,
            builder,
            store,
            transform: Arc::new(Identity),
            format: SnapshotFormat::default(),
            runtime,
            signals,
            pending: None,
            end_signaled: false,
        };
        Ok((session, rx))
    }

    pub fn with_format(mut self, format: SnapshotFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn ByteTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut Game {
        &mut self.game
    }

    pub fn context(&self) -> &ConstructionContext {
        &self.ctx
    }

    pub fn store(&self) -> &Arc<dyn SlotStore> {
        &self.store
    }

    pub fn state(&self) -> SessionState {
        match &self.pending {
            Some(op) => SessionState::SavingOrLoading(op.operation),
            None => SessionState::Idle,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    fn emit(&self, signal: HostSignal) {
        if self.signals.send(signal).is_err() {
            debug!("host signal receiver dropped");
        }
    }

    fn guard_idle(&self, requested: SessionRequest) -> Result<(), FictionError> {
        let Some(op) = &self.pending else {
            return Ok(());
        };
        let message = format!(
            "Cannot {} while a {} is in progress.",
            requested, op.operation
        );
        warn!("{}", message);
        metrics::inc_rejected();
        self.emit(HostSignal::Rejected {
            requested,
            in_flight: op.operation,
            message,
        });
        Err(FictionError::Busy(op.operation))
    }

    fn validated_slot(&self, operation: IoOperation, slot: &str) -> Result<String, FictionError> {
        checked_slot(slot).inspect_err(|e| {
            self.emit(HostSignal::OperationCompleted {
                operation,
                success: false,
                message: format!("Cannot {}: {}", operation, e),
            });
        })
    }

    /// Start writing the live game to `slot`. The live graph is not modified.
    pub fn begin_save(&mut self, slot: &str) -> Result<(), FictionError> {
        self.guard_idle(SessionRequest::Save)?;
        let slot = self.validated_slot(IoOperation::Save, slot)?;
        let tree = snapshot::encode(&self.game);
        debug!(
            "encoded snapshot for slot '{}' ({} nodes)",
            escape_log(&slot),
            tree.node_count()
        );

        let store = Arc::clone(&self.store);
        let transform = Arc::clone(&self.transform);
        let format = self.format;
        let worker_slot = slot.clone();
        let (tx, rx) = oneshot::channel();
        self.runtime.spawn_blocking(move || {
            let result = pack(&tree, format, transform.as_ref()).and_then(|bytes| {
                store.write(&worker_slot, &bytes)?;
                Ok(WorkerOutcome::Saved { bytes: bytes.len() })
            });
            let _ = tx.send(result);
        });

        info!("save to slot '{}' started", escape_log(&slot));
        metrics::inc_started(IoOperation::Save);
        self.pending = Some(PendingOp {
            operation: IoOperation::Save,
            slot,
            rx,
        });
        Ok(())
    }

    /// Start restoring `slot`. The live graph stays installed until the worker finishes
    /// and `poll`/`wait` swaps the new one in.
    pub fn begin_load(&mut self, slot: &str) -> Result<(), FictionError> {
        self.guard_idle(SessionRequest::Load)?;
        let slot = self.validated_slot(IoOperation::Load, slot)?;
        let catalog = BehaviorCatalog::capture(&self.game);
        debug!(
            "captured {} behavior keys from live game before load",
            catalog.len()
        );

        let store = Arc::clone(&self.store);
        let transform = Arc::clone(&self.transform);
        let builder = Arc::clone(&self.builder);
        let worker_slot = slot.clone();
        let (tx, rx) = oneshot::channel();
        self.runtime.spawn_blocking(move || {
            let result = load_worker(&worker_slot, store.as_ref(), transform.as_ref(), &builder, &catalog);
            let _ = tx.send(result);
        });

        info!("load from slot '{}' started", escape_log(&slot));
        metrics::inc_started(IoOperation::Load);
        self.pending = Some(PendingOp {
            operation: IoOperation::Load,
            slot,
            rx,
        });
        Ok(())
    }

    /// Non-blocking check for a finished operation.
    pub fn poll(&mut self) -> Option<Completion> {
        let mut pending = self.pending.take()?;
        match pending.rx.try_recv() {
            Ok(outcome) => Some(self.finish(pending, outcome)),
            Err(oneshot::error::TryRecvError::Empty) => {
                self.pending = Some(pending);
                None
            }
            Err(oneshot::error::TryRecvError::Closed) => Some(self.finish(
                pending,
                Err(FictionError::Internal(
                    "worker stopped without reporting".into(),
                )),
            )),
        }
    }

    /// Wait for the outstanding operation, if any.
    pub async fn wait(&mut self) -> Option<Completion> {
        let rx = &mut self.pending.as_mut()?.rx;
        let outcome = rx.await.unwrap_or_else(|_| {
            Err(FictionError::Internal(
                "worker stopped without reporting".into(),
            ))
        });
        let pending = self.pending.take()?;
        Some(self.finish(pending, outcome))
    }

    fn finish(
        &mut self,
        pending: PendingOp,
        outcome: Result<WorkerOutcome, FictionError>,
    ) -> Completion {
        let PendingOp {
            operation, slot, ..
        } = pending;
        let (success, message) = match outcome {
            Ok(WorkerOutcome::Saved { bytes }) => {
                info!("saved slot '{}' ({} bytes)", escape_log(&slot), bytes);
                (true, format!("Saved to slot '{}'.", slot))
            }
            Ok(WorkerOutcome::Loaded {
                game,
                ctx,
                report,
                snapshot_id,
            }) => {
                self.game = *game;
                self.ctx = ctx;
                self.end_signaled = false;
                metrics::add_reattached(report.reattached);
                info!(
                    "loaded slot '{}' (snapshot {}, {} of {} entities reattached)",
                    escape_log(&slot),
                    snapshot_id,
                    report.reattached,
                    report.targets
                );
                self.emit(HostSignal::FrameUpdated);
                (true, format!("Loaded slot '{}'.", slot))
            }
            Err(e) => {
                if e.is_structural() {
                    warn!("slot '{}' holds a malformed snapshot tree", escape_log(&slot));
                }
                warn!("{} of slot '{}' failed: {}", operation, escape_log(&slot), e);
                let verb = match operation {
                    IoOperation::Save => "Save to",
                    IoOperation::Load => "Load from",
                };
                (false, format!("{} slot '{}' failed: {}", verb, slot, e))
            }
        };
        if success {
            metrics::inc_completed(operation);
        } else {
            metrics::inc_failed(operation);
        }
        self.emit(HostSignal::OperationCompleted {
            operation,
            success,
            message: message.clone(),
        });
        Completion {
            operation,
            slot,
            success,
            message,
        }
    }

    /// Throw the live game away and build a fresh one.
    pub fn new_game(&mut self) -> Result<(), FictionError> {
        self.guard_idle(SessionRequest::NewGame)?;
        self.ctx.reset_session_ids();
        self.game = (self.builder)(&mut self.ctx);
        self.end_signaled = false;
        info!("started new game '{}'", self.game.core.name);
        self.emit(HostSignal::FrameUpdated);
        Ok(())
    }

    /// Tell the host the frame changed. Also reports the game ending, once.
    pub fn refresh(&mut self) {
        self.emit(HostSignal::FrameUpdated);
        if let Some(reason) = self.game.ended {
            if !self.end_signaled {
                self.end_signaled = true;
                self.emit(HostSignal::GameEnded(reason));
            }
        }
    }

    pub fn end(&mut self, reason: EndReason) {
        self.game.end(reason);
        self.refresh();
    }

    pub fn list_slots(&self) -> Result<Vec<String>, FictionError> {
        self.store.list()
    }
}

fn load_worker(
    slot: &str,
    store: &dyn SlotStore,
    transform: &dyn ByteTransform,
    builder: &WorldBuilder,
    catalog: &BehaviorCatalog,
) -> Result<WorkerOutcome, FictionError> {
    let bytes = store.read(slot)?;
    let (envelope, tree) = unpack(slot, bytes, transform)?;
    let mut ctx = ConstructionContext::new();
    ctx.reset_session_ids();
    let skeleton = builder(&mut ctx);
    let mut game = snapshot::decode(&tree, Some(skeleton), &mut ctx)?;
    let report = catalog.apply(&mut game);
    Ok(WorkerOutcome::Loaded {
        game: Box::new(game),
        ctx,
        report,
        snapshot_id: envelope.snapshot_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use crate::storage::FileSlotStore;
    use tempfile::TempDir;

    fn session(tmp: &TempDir) -> (Session, mpsc::UnboundedReceiver<HostSignal>) {
        let store = Arc::new(FileSlotStore::new(tmp.path()).unwrap());
        Session::new(demo::world_builder(), store).unwrap()
    }

    #[tokio::test]
    async fn second_request_is_rejected_while_busy() {
        let tmp = TempDir::new().unwrap();
        let (mut session, mut signals) = session(&tmp);
        session.begin_save("one").unwrap();
        assert_eq!(session.state(), SessionState::SavingOrLoading(IoOperation::Save));
        let err = session.begin_load("one").unwrap_err();
        assert!(matches!(err, FictionError::Busy(IoOperation::Save)));
        assert!(matches!(
            signals.recv().await,
            Some(HostSignal::Rejected {
                requested: SessionRequest::Load,
                in_flight: IoOperation::Save,
                ..
            })
        ));
        let done = session.wait().await.unwrap();
        assert!(done.success, "{}", done.message);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn new_game_while_busy_is_rejected_with_a_message() {
        let tmp = TempDir::new().unwrap();
        let (mut session, mut signals) = session(&tmp);
        let rejected_before = metrics::snapshot().rejected;
        session.begin_save("one").unwrap();
        assert!(matches!(
            session.new_game(),
            Err(FictionError::Busy(IoOperation::Save))
        ));
        assert_eq!(
            signals.recv().await,
            Some(HostSignal::Rejected {
                requested: SessionRequest::NewGame,
                in_flight: IoOperation::Save,
                message: "Cannot start a new game while a save is in progress.".into(),
            })
        );
        assert!(metrics::snapshot().rejected > rejected_before);
        assert!(session.wait().await.unwrap().success);
        session.new_game().unwrap();
    }

    #[tokio::test]
    async fn missing_slot_reports_failure_and_keeps_live_game() {
        let tmp = TempDir::new().unwrap();
        let (mut session, _signals) = session(&tmp);
        session.game_mut().move_player(crate::fiction::types::Direction::North);
        let before = snapshot::encode(session.game());
        session.begin_load("nothing-here").unwrap();
        let done = session.wait().await.unwrap();
        assert!(!done.success);
        assert!(done.message.contains("nothing-here"));
        assert_eq!(snapshot::encode(session.game()), before);
    }

    #[tokio::test]
    async fn invalid_slot_never_starts_a_worker() {
        let tmp = TempDir::new().unwrap();
        let (mut session, mut signals) = session(&tmp);
        assert!(matches!(
            session.begin_save("../x"),
            Err(FictionError::InvalidSlot(_))
        ));
        assert!(!session.is_busy());
        assert!(matches!(
            signals.recv().await,
            Some(HostSignal::OperationCompleted { success: false, .. })
        ));
    }
}
