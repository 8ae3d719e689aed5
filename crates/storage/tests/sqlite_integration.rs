use chrono::{Duration, NaiveTime};
use review_core::model::{
    Attempt, FlashcardId, LearnerId, Rating, ReviewSlotDraft, ReviewState, ReviewStatus,
    SchedulerParams, SlotId,
};
use review_core::scheduler::Scheduler;
use review_core::time::fixed_now;
use storage::repository::{
    AttemptRepository, ReviewPersistence, ReviewStateRepository, SlotRepository, Storage,
    StorageError,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn fresh(learner: u64, card: u64) -> ReviewState {
    ReviewState::new(
        LearnerId::new(learner),
        FlashcardId::new(card),
        &SchedulerParams::default(),
        fixed_now(),
    )
}

fn attempt_for(
    before: &ReviewState,
    after: &ReviewState,
    rating: Rating,
    presented_at: chrono::DateTime<chrono::Utc>,
) -> Attempt {
    Attempt {
        learner_id: before.learner_id,
        flashcard_id: before.flashcard_id,
        rating,
        rated_at: presented_at + Duration::seconds(10),
        presented_at,
        interval_before: before.interval_days,
        interval_after: after.interval_days,
    }
}

#[tokio::test]
async fn sqlite_bootstrap_and_review_round_trip() {
    let repo = connect("memdb_review_roundtrip").await;
    let learner = LearnerId::new(1);
    let card = FlashcardId::new(10);

    let stored = repo.insert_state_if_absent(&fresh(1, 10)).await.unwrap();
    assert_eq!(stored.status, ReviewStatus::New);
    assert_eq!(stored.version, 0);
    assert!(stored.due_at.is_none());

    // A second bootstrap must not reset anything.
    let again = repo.insert_state_if_absent(&fresh(1, 10)).await.unwrap();
    assert_eq!(again, stored);

    let now = fixed_now();
    let next = Scheduler::default().schedule(&stored, Rating::Good, now).state;
    let applied = repo
        .apply_review(
            stored.version,
            &next,
            attempt_for(&stored, &next, Rating::Good, now),
        )
        .await
        .unwrap();
    assert_eq!(applied.version, 1);

    let fetched = repo.get_state(learner, card).await.unwrap();
    assert_eq!(fetched.version, 1);
    assert_eq!(fetched.repetitions, 1);
    assert_eq!(fetched.status, ReviewStatus::Learning);
    assert_eq!(fetched.interval_days, 1.0);
    assert_eq!(fetched.last_reviewed_at, Some(now));
    assert_eq!(fetched.due_at, Some(now + Duration::days(1)));

    let found = repo
        .find_attempt(learner, card, now)
        .await
        .unwrap()
        .expect("attempt recorded");
    assert_eq!(found.id, applied.attempt_id);
    assert_eq!(found.attempt.rating, Rating::Good);
    assert_eq!(found.attempt.interval_after, 1.0);
}

#[tokio::test]
async fn sqlite_rejects_stale_and_duplicate_writes() {
    let repo = connect("memdb_review_conflicts").await;
    let stored = repo.insert_state_if_absent(&fresh(1, 20)).await.unwrap();
    let now = fixed_now();
    let scheduler = Scheduler::default();

    let good = scheduler.schedule(&stored, Rating::Good, now).state;
    repo.apply_review(0, &good, attempt_for(&stored, &good, Rating::Good, now))
        .await
        .unwrap();

    // Second tab submits against the same pre-update state.
    let later = now + Duration::seconds(30);
    let again = scheduler.schedule(&stored, Rating::Again, later).state;
    let err = repo
        .apply_review(0, &again, attempt_for(&stored, &again, Rating::Again, later))
        .await
        .unwrap_err();
    assert_eq!(err, StorageError::Stale);

    // Retry of the already applied presentation.
    let err = repo
        .apply_review(1, &good, attempt_for(&stored, &good, Rating::Good, now))
        .await
        .unwrap_err();
    assert_eq!(err, StorageError::DuplicateAttempt);

    let state = repo
        .get_state(LearnerId::new(1), FlashcardId::new(20))
        .await
        .unwrap();
    assert_eq!(state.version, 1);
    assert_eq!(state.lapses, 0);

    let log = repo
        .attempts_since(LearnerId::new(1), now - Duration::days(1))
        .await
        .unwrap();
    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn sqlite_apply_review_inserts_missing_row_at_version_zero() {
    let repo = connect("memdb_review_insert").await;
    let state = fresh(2, 30);
    let now = fixed_now();
    let next = Scheduler::default().schedule(&state, Rating::Easy, now).state;

    let applied = repo
        .apply_review(0, &next, attempt_for(&state, &next, Rating::Easy, now))
        .await
        .unwrap();
    assert_eq!(applied.version, 1);

    let stored = repo
        .get_state(LearnerId::new(2), FlashcardId::new(30))
        .await
        .unwrap();
    assert_eq!(stored.interval_days, 4.0);
}

#[tokio::test]
async fn sqlite_attempts_since_filters_by_learner_and_time() {
    let repo = connect("memdb_attempt_window").await;
    let scheduler = Scheduler::default();
    let base = fixed_now();

    for (card, offset_days) in [(1_u64, 40_i64), (2, 10), (3, 1)] {
        let state = repo.insert_state_if_absent(&fresh(1, card)).await.unwrap();
        let at = base - Duration::days(offset_days);
        let next = scheduler.schedule(&state, Rating::Hard, at).state;
        repo.apply_review(0, &next, attempt_for(&state, &next, Rating::Hard, at))
            .await
            .unwrap();
    }
    let other = repo.insert_state_if_absent(&fresh(9, 1)).await.unwrap();
    let next = scheduler.schedule(&other, Rating::Good, base).state;
    repo.apply_review(0, &next, attempt_for(&other, &next, Rating::Good, base))
        .await
        .unwrap();

    let recent = repo
        .attempts_since(LearnerId::new(1), base - Duration::days(30))
        .await
        .unwrap();
    let cards: Vec<u64> = recent
        .iter()
        .map(|r| r.attempt.flashcard_id.value())
        .collect();
    assert_eq!(cards, vec![2, 3]);
}

#[tokio::test]
async fn sqlite_deletes_states_for_removed_card() {
    let repo = connect("memdb_delete_card").await;
    repo.insert_state_if_absent(&fresh(1, 5)).await.unwrap();
    repo.insert_state_if_absent(&fresh(2, 5)).await.unwrap();
    repo.insert_state_if_absent(&fresh(1, 6)).await.unwrap();

    let removed = repo.delete_states_for_card(FlashcardId::new(5)).await.unwrap();
    assert_eq!(removed, 2);

    let left = repo.states_for_learner(LearnerId::new(1)).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].flashcard_id, FlashcardId::new(6));
    assert_eq!(
        repo.get_state(LearnerId::new(2), FlashcardId::new(5))
            .await
            .unwrap_err(),
        StorageError::NotFound
    );
}

#[tokio::test]
async fn sqlite_slot_crud_round_trip() {
    let repo = connect("memdb_slots").await;
    let learner = LearnerId::new(4);
    let draft = |day: u8, start: (u32, u32), end: (u32, u32), capacity: Option<u32>| {
        ReviewSlotDraft {
            day_of_week: day,
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            capacity,
        }
        .validate(learner)
        .unwrap()
    };

    let evening = repo
        .insert_slot(&draft(1, (16, 0), (16, 30), None))
        .await
        .unwrap();
    let morning = repo
        .insert_slot(&draft(1, (8, 0), (8, 20), Some(5)))
        .await
        .unwrap();
    let sunday = repo
        .insert_slot(&draft(0, (10, 0), (11, 0), Some(3)))
        .await
        .unwrap();

    let listed = repo.slots_for_learner(learner).await.unwrap();
    let ids: Vec<Option<SlotId>> = listed.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![sunday.id, morning.id, evening.id]);
    assert_eq!(listed[1].capacity, Some(5));
    assert_eq!(listed[1].start_time, NaiveTime::from_hms_opt(8, 0, 0).unwrap());

    let mut moved = morning.clone();
    moved.end_time = NaiveTime::from_hms_opt(8, 45, 0).unwrap();
    repo.update_slot(&moved).await.unwrap();
    let fetched = repo.get_slot(moved.id.unwrap()).await.unwrap();
    assert_eq!(fetched, moved);

    repo.delete_slot(evening.id.unwrap()).await.unwrap();
    assert_eq!(
        repo.get_slot(evening.id.unwrap()).await.unwrap_err(),
        StorageError::NotFound
    );
    assert_eq!(repo.slots_for_learner(learner).await.unwrap().len(), 2);
}

#[tokio::test]
async fn sqlite_overlapping_slot_write_is_rolled_back() {
    let repo = connect("memdb_slot_overlap").await;
    let learner = LearnerId::new(6);
    let draft = |start: u32, end: u32| {
        ReviewSlotDraft {
            day_of_week: 2,
            start_time: NaiveTime::from_hms_opt(start, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end, 0, 0).unwrap(),
            capacity: Some(4),
        }
        .validate(learner)
        .unwrap()
    };

    let first = repo.insert_slot(&draft(8, 10)).await.unwrap();
    let later = repo.insert_slot(&draft(12, 13)).await.unwrap();
    assert_eq!(
        repo.insert_slot(&draft(9, 11)).await.unwrap_err(),
        StorageError::Conflict
    );

    let mut widened = later.clone();
    widened.start_time = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    assert_eq!(
        repo.update_slot(&widened).await.unwrap_err(),
        StorageError::Conflict
    );

    let listed = repo.slots_for_learner(learner).await.unwrap();
    assert_eq!(listed, vec![first, later]);
}

#[tokio::test]
async fn storage_sqlite_wires_every_repository() {
    let storage = Storage::sqlite("sqlite:file:memdb_storage_wiring?mode=memory&cache=shared")
        .await
        .expect("storage");
    let state = storage.states.insert_state_if_absent(&fresh(1, 1)).await.unwrap();
    let now = fixed_now();
    let next = Scheduler::default().schedule(&state, Rating::Good, now).state;
    storage
        .reviews
        .apply_review(0, &next, attempt_for(&state, &next, Rating::Good, now))
        .await
        .unwrap();
    assert!(
        storage
            .attempts
            .find_attempt(LearnerId::new(1), FlashcardId::new(1), now)
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        storage
            .slots
            .slots_for_learner(LearnerId::new(1))
            .await
            .unwrap()
            .is_empty()
    );
}
