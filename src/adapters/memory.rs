use crate::config::toml_config::CatalogConfig;
use crate::config::EngineConfig;
use crate::domain::model::{
    Enrollment, OfferingDetails, OfferingId, ScheduledEnrollment, StudentId,
};
use crate::domain::ports::{EnrollmentGateway, StoreResult, TransactionManager};
use crate::utils::error::{ConfigError, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

const ENROLLMENT_UNIQUE: &str = "enrollments_student_offering_key";

#[derive(Debug, Clone)]
pub struct OfferingRow {
    pub course_code: String,
    pub capacity: i64,
    pub start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Tables {
    courses: HashMap<String, i64>,
    offerings: HashMap<OfferingId, OfferingRow>,
    enrollments: Vec<Enrollment>,
}

impl Tables {
    fn contains_pair(&self, student_id: &StudentId, offering_id: &OfferingId) -> bool {
        self.enrollments
            .iter()
            .any(|e| &e.student_id == student_id && &e.offering_id == offering_id)
    }
}

/// Row lock table keyed by primary key. Entries are created lazily and kept
/// for the life of the store.
#[derive(Debug, Default)]
struct RowLocks {
    rows: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RowLocks {
    fn handle(&self, key: &str) -> StoreResult<Arc<tokio::sync::Mutex<()>>> {
        let mut rows = lock(&self.rows)?;
        Ok(rows
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }
}

type PairKey = (StudentId, OfferingId);
type ReservedPairs = Arc<Mutex<HashSet<PairKey>>>;

/// A (student, offering) pair claimed by an uncommitted insert. Other
/// writers see the pair as taken until the claim is dropped.
struct PairClaim {
    reserved: ReservedPairs,
    key: PairKey,
}

impl Drop for PairClaim {
    fn drop(&mut self) {
        if let Ok(mut reserved) = self.reserved.lock() {
            reserved.remove(&self.key);
        }
    }
}

#[derive(Default)]
struct TxState {
    finished: bool,
    pending: Vec<Enrollment>,
    claims: Vec<PairClaim>,
    held: HashSet<String>,
    guards: Vec<OwnedMutexGuard<()>>,
}

/// Handle to an open [`MemoryStore`] transaction.
///
/// Locks and buffered inserts live behind the shared state; once the last
/// clone is dropped without a commit everything is discarded.
#[derive(Clone)]
pub struct MemoryTx {
    id: u64,
    state: Arc<Mutex<TxState>>,
}

impl MemoryTx {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, TxState>> {
        let state = lock(&self.state)?;
        if state.finished {
            return Err(StoreError::backend(format!(
                "transaction {} is already finished",
                self.id
            )));
        }
        Ok(state)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        self.state().map(|_| ())
    }
}

impl std::fmt::Debug for MemoryTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTx").field("id", &self.id).finish()
    }
}

/// In-process relational store with row locks and buffered transactions.
///
/// Reads inside a transaction see committed rows plus that transaction's own
/// pending inserts. The unique pair constraint is checked at insert time
/// against committed rows and against pairs claimed by open transactions.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    reserved: ReservedPairs,
    student_locks: RowLocks,
    offering_locks: RowLocks,
    lock_timeout: Duration,
    next_tx_id: AtomicU64,
    next_enrollment_id: AtomicU64,
    unavailable: AtomicBool,
    fail_next_commit: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> StoreResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StoreError::backend("store mutex poisoned"))
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl MemoryStore {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            reserved: Arc::new(Mutex::new(HashSet::new())),
            student_locks: RowLocks::default(),
            offering_locks: RowLocks::default(),
            lock_timeout: config.lock_timeout(),
            next_tx_id: AtomicU64::new(1),
            next_enrollment_id: AtomicU64::new(1),
            unavailable: AtomicBool::new(false),
            fail_next_commit: AtomicBool::new(false),
        }
    }

    /// Builds a store seeded with the catalog's courses, offerings and
    /// existing enrollments.
    pub fn from_catalog(catalog: &CatalogConfig) -> Result<Self, ConfigError> {
        let store = Self::new(&catalog.engine);
        for course in &catalog.courses {
            store.insert_course(&course.code, course.credit_load)?;
        }
        for offering in &catalog.offerings {
            store.insert_offering(
                OfferingId::new(offering.id.clone()),
                OfferingRow {
                    course_code: offering.course.clone(),
                    capacity: offering.capacity,
                    start_time: offering.parsed_start_time()?,
                },
            )?;
        }
        for entry in &catalog.enrollments {
            store.seed_enrollment(
                &StudentId::new(entry.student_id.clone()),
                &OfferingId::new(entry.offering_id.clone()),
            )?;
        }
        tracing::info!(
            "📚 Seeded store: {} courses, {} offerings, {} enrollments",
            catalog.courses.len(),
            catalog.offerings.len(),
            catalog.enrollments.len()
        );
        Ok(store)
    }

    pub fn insert_course(&self, code: &str, credit_load: i64) -> StoreResult<()> {
        lock(&self.tables)?
            .courses
            .insert(code.to_string(), credit_load);
        Ok(())
    }

    pub fn insert_offering(&self, offering_id: OfferingId, row: OfferingRow) -> StoreResult<()> {
        lock(&self.tables)?.offerings.insert(offering_id, row);
        Ok(())
    }

    /// Inserts a committed enrollment directly, bypassing every business
    /// rule except the unique pair constraint.
    pub fn seed_enrollment(
        &self,
        student_id: &StudentId,
        offering_id: &OfferingId,
    ) -> StoreResult<Enrollment> {
        let mut tables = lock(&self.tables)?;
        let key = (student_id.clone(), offering_id.clone());
        if tables.contains_pair(student_id, offering_id) || lock(&self.reserved)?.contains(&key) {
            return Err(StoreError::UniqueViolation {
                constraint: ENROLLMENT_UNIQUE,
            });
        }
        let enrollment = self.new_enrollment(student_id, offering_id);
        tables.enrollments.push(enrollment.clone());
        Ok(enrollment)
    }

    /// Number of committed enrollments across all offerings.
    pub fn enrollment_count(&self) -> StoreResult<usize> {
        Ok(lock(&self.tables)?.enrollments.len())
    }

    /// Makes every subsequent operation fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes the next commit fail after discarding the transaction.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "memory store is offline".to_string(),
            });
        }
        Ok(())
    }

    fn new_enrollment(&self, student_id: &StudentId, offering_id: &OfferingId) -> Enrollment {
        Enrollment {
            id: self.next_enrollment_id.fetch_add(1, Ordering::SeqCst),
            student_id: student_id.clone(),
            offering_id: offering_id.clone(),
            enrolled_at: Utc::now(),
        }
    }

    /// Committed rows plus the transaction's pending inserts.
    fn visible_enrollments(&self, tx: Option<&MemoryTx>) -> StoreResult<Vec<Enrollment>> {
        let mut rows = lock(&self.tables)?.enrollments.clone();
        if let Some(tx) = tx {
            rows.extend(tx.state()?.pending.iter().cloned());
        }
        Ok(rows)
    }

    async fn acquire_row_lock(
        &self,
        tx: &MemoryTx,
        locks: &RowLocks,
        key: String,
    ) -> StoreResult<()> {
        let already_held = tx.state()?.held.contains(&key);
        if already_held {
            return Ok(());
        }

        let handle = locks.handle(&key)?;
        let guard = tokio::time::timeout(self.lock_timeout, handle.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout {
                resource: key.clone(),
            })?;

        tracing::trace!("Transaction {} locked {}", tx.id, key);
        let mut state = tx.state()?;
        state.held.insert(key);
        state.guards.push(guard);
        Ok(())
    }

    fn finish(&self, tx: &MemoryTx) -> StoreResult<TxState> {
        let mut state = tx.state()?;
        let taken = std::mem::take(&mut *state);
        state.finished = true;
        Ok(taken)
    }
}

#[async_trait]
impl TransactionManager for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> StoreResult<MemoryTx> {
        self.ensure_available()?;
        let id = self.next_tx_id.fetch_add(1, Ordering::SeqCst);
        tracing::trace!("Begin transaction {}", id);
        Ok(MemoryTx {
            id,
            state: Arc::new(Mutex::new(TxState::default())),
        })
    }

    async fn commit(&self, tx: MemoryTx) -> StoreResult<()> {
        // 鎖與唯一鍵保留在 TxState 被丟棄時才釋放，必須晚於寫入提交
        let state = self.finish(&tx)?;

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: format!("connection lost while committing transaction {}", tx.id),
            });
        }
        self.ensure_available()?;

        let TxState {
            pending,
            claims,
            guards,
            ..
        } = state;
        let inserted = pending.len();
        lock(&self.tables)?.enrollments.extend(pending);
        drop(claims);
        drop(guards);

        tracing::trace!("Committed transaction {} ({} inserts)", tx.id, inserted);
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> StoreResult<()> {
        let state = self.finish(&tx)?;
        tracing::trace!(
            "Rolled back transaction {} ({} pending discarded)",
            tx.id,
            state.pending.len()
        );
        Ok(())
    }
}

#[async_trait]
impl EnrollmentGateway for MemoryStore {
    async fn enrollment_exists(
        &self,
        tx: Option<&MemoryTx>,
        student_id: &StudentId,
        offering_id: &OfferingId,
    ) -> StoreResult<bool> {
        self.ensure_available()?;
        Ok(self
            .visible_enrollments(tx)?
            .iter()
            .any(|e| &e.student_id == student_id && &e.offering_id == offering_id))
    }

    async fn get_offering_with_course_details(
        &self,
        tx: Option<&MemoryTx>,
        offering_id: &OfferingId,
    ) -> StoreResult<OfferingDetails> {
        self.ensure_available()?;
        if let Some(tx) = tx {
            tx.ensure_open()?;
        }
        let tables = lock(&self.tables)?;
        let offering = tables
            .offerings
            .get(offering_id)
            .ok_or_else(|| StoreError::not_found("offering", offering_id.as_str()))?;
        let credit_load = tables
            .courses
            .get(&offering.course_code)
            .copied()
            .ok_or_else(|| StoreError::not_found("course", offering.course_code.as_str()))?;

        Ok(OfferingDetails {
            offering_id: offering_id.clone(),
            capacity: offering.capacity,
            start_time: offering.start_time,
            credit_load,
        })
    }

    async fn count_active_enrollments(
        &self,
        tx: Option<&MemoryTx>,
        offering_id: &OfferingId,
    ) -> StoreResult<i64> {
        self.ensure_available()?;
        let count = self
            .visible_enrollments(tx)?
            .iter()
            .filter(|e| &e.offering_id == offering_id)
            .count();
        Ok(count as i64)
    }

    async fn list_student_enrollments_with_details(
        &self,
        tx: Option<&MemoryTx>,
        student_id: &StudentId,
    ) -> StoreResult<Vec<ScheduledEnrollment>> {
        self.ensure_available()?;
        let enrollments = self.visible_enrollments(tx)?;
        let tables = lock(&self.tables)?;

        // LEFT JOIN：缺少開課或課程資料時以空值回傳
        Ok(enrollments
            .iter()
            .filter(|e| &e.student_id == student_id)
            .map(|e| {
                let offering = tables.offerings.get(&e.offering_id);
                let credit_load = offering
                    .and_then(|o| tables.courses.get(&o.course_code))
                    .copied()
                    .unwrap_or(0);
                ScheduledEnrollment {
                    offering_id: e.offering_id.clone(),
                    start_time: offering.and_then(|o| o.start_time),
                    credit_load,
                }
            })
            .collect())
    }

    async fn create_enrollment(
        &self,
        tx: Option<&MemoryTx>,
        student_id: &StudentId,
        offering_id: &OfferingId,
    ) -> StoreResult<Enrollment> {
        self.ensure_available()?;
        let Some(tx) = tx else {
            return self.seed_enrollment(student_id, offering_id);
        };

        let tables = lock(&self.tables)?;
        if !tables.offerings.contains_key(offering_id) {
            return Err(StoreError::not_found("offering", offering_id.as_str()));
        }
        let mut state = tx.state()?;
        // 已提交或被其他未結束交易保留的組合皆視為唯一鍵衝突
        let key = (student_id.clone(), offering_id.clone());
        let mut reserved = lock(&self.reserved)?;
        if tables.contains_pair(student_id, offering_id) || reserved.contains(&key) {
            return Err(StoreError::UniqueViolation {
                constraint: ENROLLMENT_UNIQUE,
            });
        }
        reserved.insert(key.clone());
        drop(reserved);
        drop(tables);

        let enrollment = self.new_enrollment(student_id, offering_id);
        state.pending.push(enrollment.clone());
        state.claims.push(PairClaim {
            reserved: Arc::clone(&self.reserved),
            key,
        });
        Ok(enrollment)
    }

    async fn lock_student(&self, tx: Option<&MemoryTx>, student_id: &StudentId) -> StoreResult<()> {
        self.ensure_available()?;
        match tx {
            Some(tx) => {
                self.acquire_row_lock(tx, &self.student_locks, format!("student:{}", student_id))
                    .await
            }
            None => Ok(()),
        }
    }

    async fn lock_offering(
        &self,
        tx: Option<&MemoryTx>,
        offering_id: &OfferingId,
    ) -> StoreResult<()> {
        self.ensure_available()?;
        match tx {
            Some(tx) => {
                self.acquire_row_lock(
                    tx,
                    &self.offering_locks,
                    format!("offering:{}", offering_id),
                )
                .await
            }
            None => Ok(()),
        }
    }

    async fn list_offering_roster(
        &self,
        tx: Option<&MemoryTx>,
        offering_id: &OfferingId,
    ) -> StoreResult<Vec<Enrollment>> {
        self.ensure_available()?;
        let mut roster: Vec<Enrollment> = self
            .visible_enrollments(tx)?
            .into_iter()
            .filter(|e| &e.offering_id == offering_id)
            .collect();
        roster.sort_by_key(|e| e.id);
        Ok(roster)
    }
}
