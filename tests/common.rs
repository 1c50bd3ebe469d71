#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use rand::{distributions::Alphanumeric, Rng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

use reservation_engine::background::JobQueue;
use reservation_engine::bus::EventBus;
use reservation_engine::domain::models::booking::{Booking, BookingStatus, NewBookingParams};
use reservation_engine::domain::models::job::{Job, JobStatus};
use reservation_engine::domain::models::slot::{Slot, SlotSnapshot, SlotStatus};
use reservation_engine::domain::models::user::{Role, User};
use reservation_engine::domain::ports::{
    AvailabilityCache, BookingOutcome, BookingRepository, CreateBookingParams, JobRepository,
    LockManager, QueueCounts, SlotRepository, UserRepository,
};
use reservation_engine::domain::services::coordinator::BookingCoordinator;
use reservation_engine::domain::services::policy::{self, BookingLimits};
use reservation_engine::error::AppError;

/// In-memory lock manager honoring the lease-token contract: one unexpired
/// lease per key, compare-and-delete release.
#[derive(Default)]
pub struct InMemoryLockManager {
    leases: Mutex<HashMap<String, (String, Instant)>>,
}

#[async_trait]
impl LockManager for InMemoryLockManager {
    async fn acquire(&self, key: &str, ttl: Duration) -> Option<String> {
        let mut leases = self.leases.lock().unwrap();
        let now = Instant::now();
        if let Some((_, expires)) = leases.get(key) {
            if *expires > now {
                return None;
            }
        }
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect();
        leases.insert(key.to_string(), (token.clone(), now + ttl));
        Some(token)
    }

    async fn release(&self, key: &str, lease_token: &str) -> bool {
        let mut leases = self.leases.lock().unwrap();
        match leases.get(key) {
            Some((token, expires)) if token == lease_token && *expires > Instant::now() => {
                leases.remove(key);
                true
            }
            _ => false,
        }
    }
}

/// In-memory availability cache with real TTL expiry.
#[derive(Default)]
pub struct InMemoryAvailabilityCache {
    entries: Mutex<HashMap<(Uuid, NaiveDate), (Vec<SlotSnapshot>, Instant)>>,
}

impl InMemoryAvailabilityCache {
    pub fn contains(&self, venue_id: Uuid, date: NaiveDate) -> bool {
        let entries = self.entries.lock().unwrap();
        entries
            .get(&(venue_id, date))
            .is_some_and(|(_, expires)| *expires > Instant::now())
    }
}

#[async_trait]
impl AvailabilityCache for InMemoryAvailabilityCache {
    async fn get(&self, venue_id: Uuid, date: NaiveDate) -> Option<Vec<SlotSnapshot>> {
        let entries = self.entries.lock().unwrap();
        let (snapshots, expires) = entries.get(&(venue_id, date))?;
        if *expires <= Instant::now() {
            return None;
        }
        Some(snapshots.clone())
    }

    async fn put(
        &self,
        venue_id: Uuid,
        date: NaiveDate,
        snapshots: &[SlotSnapshot],
        ttl: Duration,
    ) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert((venue_id, date), (snapshots.to_vec(), Instant::now() + ttl));
    }

    async fn invalidate(&self, venue_id: Uuid, date: NaiveDate) {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(&(venue_id, date));
    }
}

#[derive(Default)]
struct StoreInner {
    users: HashMap<Uuid, User>,
    slots: HashMap<Uuid, Slot>,
    bookings: HashMap<Uuid, Booking>,
}

/// In-memory storage backend. The mutex stands in for the row lock plus
/// SERIALIZABLE transaction; the booking algorithm itself runs through the
/// same policy functions as the Postgres repository.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryStore {
    pub fn insert_user(&self, role: Role, is_active: bool) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            role,
            is_active,
            created_at: Utc::now(),
        };
        let id = user.id;
        self.inner.lock().unwrap().users.insert(id, user);
        id
    }

    pub fn insert_slot(&self, slot: Slot) -> Uuid {
        let id = slot.id;
        self.inner.lock().unwrap().slots.insert(id, slot);
        id
    }

    pub fn slot(&self, id: Uuid) -> Slot {
        self.inner.lock().unwrap().slots[&id].clone()
    }

    pub fn booking(&self, id: Uuid) -> Booking {
        self.inner.lock().unwrap().bookings[&id].clone()
    }

    pub fn confirmed_guests(&self, slot_id: Uuid) -> i32 {
        let inner = self.inner.lock().unwrap();
        inner
            .bookings
            .values()
            .filter(|b| b.slot_id == slot_id && b.status == BookingStatus::Confirmed)
            .map(|b| b.guest_count)
            .sum()
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn create_confirmed(
        &self,
        params: &CreateBookingParams,
        limits: &BookingLimits,
    ) -> Result<BookingOutcome, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();

        match inner.users.get(&params.user_id) {
            Some(user) if user.is_active => {}
            _ => return Err(AppError::UserNotFound),
        }

        let confirmed_count = inner
            .bookings
            .values()
            .filter(|b| b.user_id == params.user_id && b.status == BookingStatus::Confirmed)
            .count() as i64;
        if confirmed_count >= limits.max_concurrent_bookings_per_user {
            return Err(AppError::MaxBookingsReached);
        }

        let slot = match inner.slots.get(&params.slot_id) {
            Some(slot) if slot.venue_id == params.venue_id => slot.clone(),
            _ => return Err(AppError::SlotNotFound),
        };

        policy::validate_slot_for_booking(
            &slot,
            params.guest_count,
            now,
            limits.max_booking_advance_days,
        )?;

        let duplicate = inner.bookings.values().any(|b| {
            b.user_id == params.user_id
                && b.slot_id == params.slot_id
                && b.status == BookingStatus::Confirmed
        });
        if duplicate {
            return Err(AppError::DuplicateBooking);
        }

        let booking = Booking::confirmed(
            NewBookingParams {
                user_id: params.user_id,
                guest_count: params.guest_count,
                notes: params.notes.clone(),
            },
            &slot,
            now,
        );

        let mut slot = slot;
        slot.debit(params.guest_count, now);

        inner.slots.insert(slot.id, slot.clone());
        inner.bookings.insert(booking.id, booking.clone());

        Ok(BookingOutcome { booking, slot })
    }

    async fn cancel(
        &self,
        booking_id: Uuid,
        reason: Option<&str>,
    ) -> Result<BookingOutcome, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();

        let mut booking = inner
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or(AppError::BookingNotFound)?;
        if booking.status.is_terminal() {
            return Err(AppError::CancellationNotAllowed);
        }

        let mut slot = inner
            .slots
            .get(&booking.slot_id)
            .cloned()
            .ok_or_else(|| AppError::Internal("booking references missing slot".into()))?;

        booking.cancel(reason, now);
        slot.credit(booking.guest_count, now);

        inner.bookings.insert(booking.id, booking.clone());
        inner.slots.insert(slot.id, slot.clone());

        Ok(BookingOutcome { booking, slot })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, AppError> {
        Ok(self.inner.lock().unwrap().bookings.get(&id).cloned())
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Booking>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut bookings: Vec<Booking> = inner
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }
}

#[async_trait]
impl SlotRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Slot>, AppError> {
        Ok(self.inner.lock().unwrap().slots.get(&id).cloned())
    }

    async fn list_available(
        &self,
        venue_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<Slot>, AppError> {
        let inner = self.inner.lock().unwrap();
        let mut slots: Vec<Slot> = inner
            .slots
            .values()
            .filter(|s| s.venue_id == venue_id && s.date == date)
            .filter(|s| s.matches_availability_filter(now))
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.start_time);
        Ok(slots)
    }

    async fn block(
        &self,
        slot_id: Uuid,
        blocked_by: Uuid,
        reason: Option<&str>,
    ) -> Result<Slot, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let mut slot = inner
            .slots
            .get(&slot_id)
            .cloned()
            .ok_or(AppError::SlotNotFound)?;
        slot.block(blocked_by, reason, Utc::now());
        inner.slots.insert(slot.id, slot.clone());
        Ok(slot)
    }

    async fn unblock(&self, slot_id: Uuid) -> Result<Slot, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let mut slot = inner
            .slots
            .get(&slot_id)
            .cloned()
            .ok_or(AppError::SlotNotFound)?;
        slot.unblock(Utc::now());
        inner.slots.insert(slot.id, slot.clone());
        Ok(slot)
    }

    async fn reclaim_expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Slot>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let expired: Vec<Uuid> = inner
            .slots
            .values()
            .filter(|s| s.hold_expired(now))
            .map(|s| s.id)
            .collect();

        let mut reclaimed = Vec::new();
        for id in expired {
            let confirmed: i32 = inner
                .bookings
                .values()
                .filter(|b| b.slot_id == id && b.status == BookingStatus::Confirmed)
                .map(|b| b.guest_count)
                .sum();
            if let Some(slot) = inner.slots.get_mut(&id) {
                slot.status = SlotStatus::Available;
                slot.held_until = None;
                slot.remaining_capacity = slot.capacity - confirmed;
                slot.updated_at = now;
                reclaimed.push(slot.clone());
            }
        }
        Ok(reclaimed)
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.inner.lock().unwrap().users.get(&id).cloned())
    }
}

/// In-memory job store mirroring the Postgres claim semantics.
#[derive(Default)]
pub struct InMemoryJobRepo {
    jobs: Mutex<Vec<Job>>,
}

impl InMemoryJobRepo {
    pub fn all(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn by_name(&self, name: &str) -> Vec<Job> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.name == name)
            .cloned()
            .collect()
    }

    pub fn make_due(&self, id: Uuid) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.execute_at = Utc::now() - ChronoDuration::seconds(1);
        }
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepo {
    async fn enqueue(&self, job: &Job) -> Result<Job, AppError> {
        self.jobs.lock().unwrap().push(job.clone());
        Ok(job.clone())
    }

    async fn claim_due(
        &self,
        name: &str,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>, AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut due: Vec<usize> = jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.name == name && j.status == JobStatus::Pending && j.execute_at <= now)
            .map(|(i, _)| i)
            .collect();
        due.sort_by(|&a, &b| {
            jobs[b]
                .priority
                .cmp(&jobs[a].priority)
                .then(jobs[a].execute_at.cmp(&jobs[b].execute_at))
        });
        due.truncate(limit.max(0) as usize);

        let mut claimed = Vec::new();
        for i in due {
            let job = &mut jobs[i];
            job.status = JobStatus::Processing;
            job.attempts += 1;
            job.updated_at = now;
            claimed.push(job.clone());
        }
        Ok(claimed)
    }

    async fn complete(&self, id: Uuid) -> Result<(), AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.status = JobStatus::Completed;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<(), AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.status = JobStatus::Failed;
            job.last_error = Some(error.to_string());
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn retry(
        &self,
        id: Uuid,
        error: &str,
        execute_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.status = JobStatus::Pending;
            job.last_error = Some(error.to_string());
            job.execute_at = execute_at;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn counts(&self, now: DateTime<Utc>) -> Result<QueueCounts, AppError> {
        let jobs = self.jobs.lock().unwrap();
        let mut counts = QueueCounts::default();
        for job in jobs.iter() {
            match job.status {
                JobStatus::Pending if job.execute_at <= now => counts.waiting += 1,
                JobStatus::Pending => counts.delayed += 1,
                JobStatus::Processing => counts.active += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn purge_finished(
        &self,
        keep_completed: i64,
        keep_failed: i64,
    ) -> Result<u64, AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut purged = 0u64;
        for (status, keep) in [
            (JobStatus::Completed, keep_completed),
            (JobStatus::Failed, keep_failed),
        ] {
            let mut finished: Vec<(Uuid, DateTime<Utc>)> = jobs
                .iter()
                .filter(|j| j.status == status)
                .map(|j| (j.id, j.updated_at))
                .collect();
            finished.sort_by(|a, b| b.1.cmp(&a.1));
            let doomed: Vec<Uuid> = finished
                .into_iter()
                .skip(keep.max(0) as usize)
                .map(|(id, _)| id)
                .collect();
            purged += doomed.len() as u64;
            jobs.retain(|j| !doomed.contains(&j.id));
        }
        Ok(purged)
    }
}

pub struct TestHarness {
    pub coordinator: Arc<BookingCoordinator>,
    pub store: Arc<InMemoryStore>,
    pub locks: Arc<InMemoryLockManager>,
    pub cache: Arc<InMemoryAvailabilityCache>,
    pub jobs: Arc<InMemoryJobRepo>,
    pub queue: Arc<JobQueue>,
    pub bus: Arc<EventBus>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_limits(BookingLimits::default())
    }

    pub fn with_limits(limits: BookingLimits) -> Self {
        let store = Arc::new(InMemoryStore::default());
        let locks = Arc::new(InMemoryLockManager::default());
        let cache = Arc::new(InMemoryAvailabilityCache::default());
        let jobs = Arc::new(InMemoryJobRepo::default());
        let queue = Arc::new(JobQueue::new(jobs.clone()));
        let bus = Arc::new(EventBus::new());

        let coordinator = Arc::new(BookingCoordinator::new(
            store.clone(),
            store.clone(),
            locks.clone(),
            cache.clone(),
            queue.clone(),
            bus.clone(),
            limits,
            Duration::from_secs(15),
            Duration::from_secs(60),
        ));

        Self {
            coordinator,
            store,
            locks,
            cache,
            jobs,
            queue,
            bus,
        }
    }

    pub fn seed_user(&self, role: Role, is_active: bool) -> Uuid {
        self.store.insert_user(role, is_active)
    }

    pub fn seed_member(&self) -> Uuid {
        self.seed_user(Role::Member, true)
    }

    pub fn seed_slot(&self, venue_id: Uuid, capacity: i32, starts_in: ChronoDuration) -> Uuid {
        let now = Utc::now();
        let start = now + starts_in;
        self.store.insert_slot(Slot {
            id: Uuid::new_v4(),
            venue_id,
            date: start.date_naive(),
            start_time: start,
            end_time: start + ChronoDuration::hours(1),
            capacity,
            remaining_capacity: capacity,
            status: SlotStatus::Available,
            duration_minutes: 60,
            price: None,
            currency: None,
            held_until: None,
            metadata: None,
            created_at: now,
            updated_at: now,
        })
    }
}
