use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use review_core::analytics::RetentionRate;
use review_core::model::{
    Attempt, FlashcardId, LearnerId, Rating, ReviewSlotDraft, ReviewState, ReviewStatus,
    SchedulerParams,
};
use review_core::scheduler::Scheduler;
use review_core::time::fixed_now;
use services::{
    Clock, EngineServices, EngineSettings, QueueOptions, RatingSubmission, ReviewService,
    ReviewServiceError, SlotService,
};
use storage::repository::{
    AppliedRecord, InMemoryRepository, ReviewPersistence, ReviewStateRepository, Storage,
    StorageError,
};

const LEARNER: LearnerId = LearnerId::new(1);

fn review_service(repo: &InMemoryRepository, clock: Clock) -> ReviewService {
    ReviewService::new(
        clock,
        Scheduler::default(),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
    )
}

fn rate(
    card: u64,
    rating: Rating,
    presented_at: DateTime<Utc>,
    expected_version: u64,
) -> RatingSubmission {
    RatingSubmission {
        learner_id: LEARNER,
        flashcard_id: FlashcardId::new(card),
        rating,
        presented_at,
        expected_version,
    }
}

fn monday_morning() -> ReviewSlotDraft {
    ReviewSlotDraft {
        day_of_week: 1,
        start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(8, 20, 0).unwrap(),
        capacity: Some(5),
    }
}

#[tokio::test]
async fn slot_capacity_holds_for_the_whole_window() {
    let repo = InMemoryRepository::new();
    let slots = SlotService::new(Arc::new(repo.clone()));
    slots.create(LEARNER, monday_morning()).await.unwrap();

    // 2024-01-01 is a Monday.
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 5, 0).unwrap();
    for card in 1..=8_u64 {
        let mut state = ReviewState::new(
            LEARNER,
            FlashcardId::new(card),
            &SchedulerParams::default(),
            now - Duration::days(30),
        );
        state.repetitions = 3;
        state.interval_days = 2.5;
        state.status = ReviewStatus::Review;
        let days = i64::try_from(card).unwrap();
        state.last_reviewed_at = Some(now - Duration::days(days) - Duration::hours(60));
        state.due_at = Some(now - Duration::days(days));
        repo.insert_state_if_absent(&state).await.unwrap();
    }

    let svc = review_service(&repo, Clock::fixed(now));
    let queue = svc
        .due_queue(LEARNER, &[], QueueOptions::default())
        .await
        .unwrap();
    let ids: Vec<u64> = queue.items.iter().map(|i| i.flashcard_id.value()).collect();
    assert_eq!(ids, vec![8, 7, 6, 5, 4]);
    assert_eq!(queue.deferred, 3);

    for item in &queue.items {
        let submission = rate(
            item.flashcard_id.value(),
            Rating::Good,
            item.presented_at,
            item.state.version,
        );
        svc.submit_rating(submission).await.unwrap();
    }

    // Asking again later in the same window yields nothing new.
    let same_window = svc
        .clone()
        .with_clock(Clock::fixed(now + Duration::minutes(2)))
        .due_queue(LEARNER, &[], QueueOptions::default())
        .await
        .unwrap();
    assert!(same_window.is_empty());
    assert_eq!(same_window.served_in_window, 5);
    assert_eq!(same_window.deferred, 3);

    let next_week = svc
        .clone()
        .with_clock(Clock::fixed(now + Duration::days(7)))
        .due_queue(LEARNER, &[], QueueOptions::default())
        .await
        .unwrap();
    assert_eq!(next_week.len(), 5);
    assert_eq!(next_week.served_in_window, 0);
    let ids: Vec<u64> = next_week.items.iter().map(|i| i.flashcard_id.value()).collect();
    assert_eq!(ids[..3], [3, 2, 1]);
}

#[tokio::test]
async fn good_streak_then_lapse_follows_sm2_progression() {
    let repo = InMemoryRepository::new();
    let t0 = fixed_now();
    let base = review_service(&repo, Clock::fixed(t0));

    let first = base.submit_rating(rate(1, Rating::Good, t0, 0)).await.unwrap();
    assert_eq!(first.interval_after, 1.0);

    let t1 = first.state.due_at.unwrap();
    let second = base
        .clone()
        .with_clock(Clock::fixed(t1))
        .submit_rating(rate(1, Rating::Good, t1, first.state.version))
        .await
        .unwrap();
    assert_eq!(second.interval_after, 2.5);
    assert_eq!(second.state.status, ReviewStatus::Review);

    let t2 = second.state.due_at.unwrap();
    let third = base
        .clone()
        .with_clock(Clock::fixed(t2))
        .submit_rating(rate(1, Rating::Good, t2, second.state.version))
        .await
        .unwrap();
    assert_eq!(third.interval_after, 6.25);

    let t3 = third.state.due_at.unwrap();
    let lapse = base
        .clone()
        .with_clock(Clock::fixed(t3))
        .submit_rating(rate(1, Rating::Again, t3, third.state.version))
        .await
        .unwrap();
    assert_eq!(lapse.interval_before, 6.25);
    assert_eq!(lapse.interval_after, 1.0);
    assert_eq!(lapse.state.lapses, 1);
    assert_eq!(lapse.state.repetitions, 0);
    assert_eq!(lapse.state.status, ReviewStatus::Learning);
    assert!((lapse.state.ease_factor - 2.3).abs() < 1e-9);
    assert_eq!(lapse.state.version, 4);
}

/// Lets a competing submission win the first write it sees.
struct RacingPersistence {
    inner: InMemoryRepository,
    raced: AtomicBool,
}

#[async_trait]
impl ReviewPersistence for RacingPersistence {
    async fn apply_review(
        &self,
        expected_version: u64,
        state: &ReviewState,
        attempt: Attempt,
    ) -> Result<AppliedRecord, StorageError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let mut rival = attempt.clone();
            rival.presented_at -= Duration::seconds(1);
            self.inner
                .apply_review(expected_version, state, rival)
                .await?;
        }
        self.inner
            .apply_review(expected_version, state, attempt)
            .await
    }
}

#[tokio::test]
async fn concurrent_submission_surfaces_stale_state() {
    let repo = InMemoryRepository::new();
    let now = fixed_now();
    let racing = RacingPersistence {
        inner: repo.clone(),
        raced: AtomicBool::new(false),
    };
    let svc = ReviewService::new(
        Clock::fixed(now),
        Scheduler::default(),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(racing),
        Arc::new(repo.clone()),
    );

    let err = svc
        .submit_rating(rate(1, Rating::Good, now, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewServiceError::StaleState));

    let state = repo.get_state(LEARNER, FlashcardId::new(1)).await.unwrap();
    assert_eq!(state.version, 1);
    assert_eq!(state.repetitions, 1);

    // Re-fetch and re-rate under a new presentation.
    let retry = svc
        .submit_rating(rate(1, Rating::Good, now + Duration::seconds(5), state.version))
        .await
        .unwrap();
    assert_eq!(retry.state.version, 2);
    assert_eq!(retry.interval_after, 2.5);
}

#[tokio::test]
async fn rating_from_an_outdated_queue_is_stale() {
    let repo = InMemoryRepository::new();
    let now = fixed_now();
    let svc = review_service(&repo, Clock::fixed(now));
    let cards = [FlashcardId::new(1)];
    let options = QueueOptions {
        include_new: true,
        max_new: None,
    };

    let tab_a = svc.due_queue(LEARNER, &cards, options).await.unwrap();
    let tab_b = svc
        .clone()
        .with_clock(Clock::fixed(now + Duration::seconds(1)))
        .due_queue(LEARNER, &cards, options)
        .await
        .unwrap();
    let (a, b) = (&tab_a.items[0], &tab_b.items[0]);
    assert_eq!(a.state.version, 0);
    assert_eq!(b.state.version, 0);
    assert_ne!(a.presented_at, b.presented_at);

    svc.submit_rating(rate(1, Rating::Good, a.presented_at, a.state.version))
        .await
        .unwrap();
    let err = svc
        .submit_rating(rate(1, Rating::Good, b.presented_at, b.state.version))
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewServiceError::StaleState));

    let state = repo.get_state(LEARNER, FlashcardId::new(1)).await.unwrap();
    assert_eq!(state.version, 1);
    assert_eq!(state.repetitions, 1);
    assert_eq!(state.interval_days, 1.0);
}

#[tokio::test]
async fn analytics_reflect_submitted_ratings() {
    let storage = Storage::in_memory();
    let now = fixed_now();
    let services =
        EngineServices::new(&storage, Clock::fixed(now), EngineSettings::default()).unwrap();

    let ratings = [Rating::Good, Rating::Good, Rating::Again, Rating::Good];
    for (card, rating) in (1_u64..).zip(ratings) {
        services
            .review()
            .submit_rating(rate(card, rating, now, 0))
            .await
            .unwrap();
    }
    services
        .review()
        .due_queue(LEARNER, &[FlashcardId::new(9)], QueueOptions::default())
        .await
        .unwrap();

    let snapshot = services.analytics().snapshot(LEARNER).await.unwrap();
    assert_eq!(snapshot.retention, RetentionRate::Rate(0.75));
    assert_eq!(snapshot.total_attempts, 4);
    assert_eq!(snapshot.rating_counts.again, 1);
    assert_eq!(snapshot.rating_counts.good, 3);
    assert_eq!(snapshot.new_count, 1);
    assert_eq!(snapshot.learning_count, 4);
    assert_eq!(snapshot.due_today, 0);
}

#[tokio::test]
async fn sqlite_engine_round_trip() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 5, 0).unwrap();
    let services = EngineServices::new_sqlite(
        "sqlite:file:memdb_engine_flow?mode=memory&cache=shared",
        Clock::fixed(now),
        EngineSettings::default(),
    )
    .await
    .expect("services");

    let slot = services
        .slots()
        .create(LEARNER, monday_morning())
        .await
        .unwrap();
    assert!(slot.id.is_some());

    let cards: Vec<FlashcardId> = (1..=7).map(FlashcardId::new).collect();
    let queue = services
        .review()
        .due_queue(
            LEARNER,
            &cards,
            QueueOptions {
                include_new: true,
                max_new: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(queue.items.len(), 5);
    assert_eq!(queue.deferred, 2);
    assert_eq!(queue.window.as_ref().and_then(|w| w.slot_id), slot.id);

    let first = &queue.items[0];
    let submission = rate(
        first.flashcard_id.value(),
        Rating::Easy,
        first.presented_at,
        first.state.version,
    );
    let receipt = services.review().submit_rating(submission).await.unwrap();
    assert_eq!(receipt.interval_after, 4.0);

    let err = services
        .review()
        .submit_rating(submission)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewServiceError::DuplicateSubmission));

    let snapshot = services.analytics().snapshot(LEARNER).await.unwrap();
    assert_eq!(snapshot.new_count, 6);
    assert_eq!(snapshot.total_attempts, 1);
    assert_eq!(snapshot.retention, RetentionRate::Rate(1.0));
}
