mod conflict;
mod error;
pub mod lifecycle;
mod mutations;
mod queries;

pub use error::BookingError;
pub use lifecycle::Transition;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::catalog::ServiceCatalog;
use crate::config::Config;
use crate::model::*;
use crate::wal::Wal;

pub type SharedLedger = Arc<RwLock<ServiceLedger>>;

/// Shared hold on the compaction gate for the duration of one mutation.
pub(super) type MutationGate = OwnedRwLockReadGuard<()>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit:
/// take the first append, drain whatever else is already queued, then one
/// fsync for the whole batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                    .record(batch.len() as f64);
                let flush_start = std::time::Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                respond_batch(batch, &result);

                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so partial bytes do not leak into
    // the next batch.
    let flush_err = wal.flush_sync().err();
    match append_err.or(flush_err) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Write event to WAL via the background group-commit writer.
async fn wal_append(wal_tx: &mpsc::Sender<WalCommand>, event: &Event) -> Result<(), BookingError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .map_err(|_| BookingError::StoreUnavailable("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| BookingError::StoreUnavailable("WAL writer dropped response".into()))?
        .map_err(|e| BookingError::StoreUnavailable(format!("WAL write failed: {e}")))
}

/// Apply an event to a ledger (no locking — caller holds the lock).
fn apply_to_ledger(ledger: &mut ServiceLedger, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::BookingCreated { booking } => {
            index.insert(booking.id, booking.service_id);
            ledger.insert(booking.clone());
        }
        Event::BookingStatusChanged { id, status, at, .. } => {
            ledger.set_status(id, *status, *at);
        }
    }
}

/// The booking scheduler: one lock-guarded ledger per service, persisted
/// through a write-ahead log.
pub struct Engine {
    pub(super) ledgers: DashMap<Ulid, SharedLedger>,
    /// Reverse lookup: booking id → service id.
    pub(super) booking_to_service: Arc<DashMap<Ulid, Ulid>>,
    pub(super) catalog: Arc<dyn ServiceCatalog>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold this shared; compaction holds it exclusively so a
    /// snapshot never misses an append racing with the file swap.
    pub(super) compaction_gate: Arc<RwLock<()>>,
    pub(super) store_timeout: Duration,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer task. Must be
    /// called inside a tokio runtime.
    pub fn new(
        wal_path: PathBuf,
        catalog: Arc<dyn ServiceCatalog>,
        store_timeout: Duration,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let booking_to_service = Arc::new(DashMap::new());
        let mut ledgers: HashMap<Ulid, ServiceLedger> = HashMap::new();
        for event in &events {
            let service_id = event.service_id();
            let ledger = ledgers
                .entry(service_id)
                .or_insert_with(|| ServiceLedger::new(service_id));
            apply_to_ledger(ledger, event, &booking_to_service);
        }
        tracing::info!(
            events = events.len(),
            services = ledgers.len(),
            bookings = booking_to_service.len(),
            "replayed booking log from {}",
            wal_path.display()
        );

        Ok(Self {
            ledgers: ledgers
                .into_iter()
                .map(|(id, ledger)| (id, Arc::new(RwLock::new(ledger))))
                .collect(),
            booking_to_service,
            catalog,
            wal_tx,
            compaction_gate: Arc::new(RwLock::new(())),
            store_timeout,
        })
    }

    pub fn open(config: &Config, catalog: Arc<dyn ServiceCatalog>) -> io::Result<Self> {
        Self::new(config.wal_path(), catalog, config.store_timeout)
    }

    /// WAL-append then apply, on a task that owns the ledger lock and the
    /// mutation gate. Once spawned the commit runs to completion even if the
    /// caller's future is dropped, so the log and the ledger never diverge.
    /// The guard comes back for reading the result.
    pub(super) async fn persist_and_apply(
        &self,
        gate: MutationGate,
        mut guard: OwnedRwLockWriteGuard<ServiceLedger>,
        event: Event,
    ) -> Result<OwnedRwLockWriteGuard<ServiceLedger>, BookingError> {
        let wal_tx = self.wal_tx.clone();
        let index = self.booking_to_service.clone();
        let commit = tokio::spawn(async move {
            let _gate = gate;
            wal_append(&wal_tx, &event).await?;
            apply_to_ledger(&mut guard, &event, &index);
            Ok::<_, BookingError>(guard)
        });
        commit
            .await
            .map_err(|e| BookingError::StoreUnavailable(format!("commit task failed: {e}")))?
    }

    pub(super) fn ledger(&self, service_id: &Ulid) -> Option<SharedLedger> {
        self.ledgers.get(service_id).map(|e| e.value().clone())
    }

    pub(super) fn ledger_or_create(&self, service_id: Ulid) -> SharedLedger {
        self.ledgers
            .entry(service_id)
            .or_insert_with(|| Arc::new(RwLock::new(ServiceLedger::new(service_id))))
            .value()
            .clone()
    }

    /// Wait for a ledger's write lock, bounded by the store timeout.
    pub(super) async fn lock_write(
        &self,
        ledger: SharedLedger,
    ) -> Result<OwnedRwLockWriteGuard<ServiceLedger>, BookingError> {
        match tokio::time::timeout(self.store_timeout, ledger.write_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => Err(self.store_timed_out()),
        }
    }

    pub(super) async fn lock_read(
        &self,
        ledger: SharedLedger,
    ) -> Result<OwnedRwLockReadGuard<ServiceLedger>, BookingError> {
        match tokio::time::timeout(self.store_timeout, ledger.read_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => Err(self.store_timed_out()),
        }
    }

    pub(super) async fn enter_mutation(&self) -> Result<MutationGate, BookingError> {
        let gate = self.compaction_gate.clone().read_owned();
        match tokio::time::timeout(self.store_timeout, gate).await {
            Ok(guard) => Ok(guard),
            Err(_) => Err(self.store_timed_out()),
        }
    }

    fn store_timed_out(&self) -> BookingError {
        metrics::counter!(crate::observability::STORE_TIMEOUTS_TOTAL).increment(1);
        tracing::warn!("booking store lock not acquired within {:?}", self.store_timeout);
        BookingError::StoreUnavailable(format!(
            "lock not acquired within {}ms",
            self.store_timeout.as_millis()
        ))
    }

    /// Lookup booking → service, acquire that service's write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<ServiceLedger>, BookingError> {
        let service_id = self
            .booking_to_service
            .get(booking_id)
            .map(|e| *e.value())
            .ok_or(BookingError::NotFound(*booking_id))?;
        let ledger = self
            .ledger(&service_id)
            .ok_or(BookingError::NotFound(*booking_id))?;
        self.lock_write(ledger).await
    }

    pub fn booking_count(&self) -> usize {
        self.booking_to_service.len()
    }
}
