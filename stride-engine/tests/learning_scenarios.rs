//! End-to-end engine scenarios over the seeded catalog fixture.

use chrono::Duration;
use std::sync::Arc;
use stride_core::{ModuleStage, QuizType, UserId};
use stride_engine::{Clock, EngineError};
use stride_storage::LearningStore;
use stride_test_utils::assertions::assert_aggregates_match_ledger;
use stride_test_utils::fixtures::{correct_answers, CatalogFixture};
use stride_test_utils::EntityIdType;

#[tokio::test]
async fn check_in_awards_activity_grants_once() {
    let fx = CatalogFixture::new();
    let user = fx.joined_user();

    let result = fx
        .engine
        .self_check_in(user, fx.activity.activity_id)
        .await
        .unwrap();
    assert!(result.checked_in);
    assert_eq!(result.checked_at, fx.clock.now());

    let awarded: Vec<_> = result
        .skills_awarded
        .iter()
        .map(|s| (s.code.as_str(), s.points_awarded, s.new_total_points, s.new_level))
        .collect();
    assert_eq!(awarded, vec![("C1", 5, 5, 1), ("C3", 3, 3, 1)]);

    fx.clock.advance(Duration::minutes(10));
    let err = fx
        .engine
        .self_check_in(user, fx.activity.activity_id)
        .await
        .unwrap_err();
    match err {
        EngineError::Conflict { checked_at, .. } => {
            assert_eq!(checked_at, Some(result.checked_at));
        }
        other => panic!("expected conflict, got {:?}", other),
    }

    let ledger = fx.store.ledger_entries(user, None).await.unwrap();
    assert_eq!(ledger.len(), 2);
}

#[tokio::test]
async fn check_in_respects_the_activity_window() {
    let fx = CatalogFixture::new();
    let user = fx.joined_user();

    fx.clock.set(fx.activity.start_date - Duration::minutes(1));
    let early = fx
        .engine
        .self_check_in(user, fx.activity.activity_id)
        .await
        .unwrap_err();
    assert!(matches!(early, EngineError::InvalidState(_)));

    let end = fx.activity.end_date.unwrap();
    fx.clock.set(end + Duration::seconds(1));
    let late = fx
        .engine
        .self_check_in(user, fx.activity.activity_id)
        .await
        .unwrap_err();
    assert!(matches!(late, EngineError::InvalidState(_)));

    fx.clock.set(end);
    assert!(fx
        .engine
        .self_check_in(user, fx.activity.activity_id)
        .await
        .is_ok());
}

#[tokio::test]
async fn non_participant_is_forbidden_even_outside_window() {
    let fx = CatalogFixture::new();
    fx.clock.set(fx.activity.start_date - Duration::days(1));
    let err = fx
        .engine
        .self_check_in(UserId::now_v7(), fx.activity.activity_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_check_ins_award_exactly_once() {
    let fx = Arc::new(CatalogFixture::new());
    let user = fx.joined_user();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let fx = fx.clone();
        handles.push(tokio::spawn(async move {
            fx.engine.self_check_in(user, fx.activity.activity_id).await
        }));
    }

    let mut successes = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(EngineError::Conflict { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(fx.store.ledger_entries(user, None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn completing_every_module_awards_module_and_course_grants_once() {
    let fx = CatalogFixture::new();
    let user = UserId::now_v7();
    let full = fx.full_module.module_id;
    let empty = fx.empty_module.module_id;

    let pre = fx
        .engine
        .submit_module_quiz(
            user,
            full,
            QuizType::PreTest,
            correct_answers(&fx.full_module, QuizType::PreTest),
        )
        .await
        .unwrap();
    assert_eq!((pre.score, pre.total, pre.passed), (5, 5, true));
    assert!(pre.update.skills_awarded.is_empty());

    fx.engine.complete_video(user, full).await.unwrap();
    let test = fx
        .engine
        .submit_module_quiz(
            user,
            full,
            QuizType::Test,
            correct_answers(&fx.full_module, QuizType::Test),
        )
        .await
        .unwrap();
    assert!(test.update.module_completed);
    assert!(!test.update.course_completed);
    assert_eq!(test.update.skills_awarded.len(), 1);
    assert_eq!(test.update.skills_awarded[0].code, "C2");
    assert_eq!(test.update.skills_awarded[0].points_awarded, 4);

    fx.engine
        .skip_stage(user, empty, ModuleStage::PreTest)
        .await
        .unwrap();
    fx.engine
        .skip_stage(user, empty, ModuleStage::Video)
        .await
        .unwrap();
    let last = fx
        .engine
        .skip_stage(user, empty, ModuleStage::Test)
        .await
        .unwrap();
    assert!(last.module_completed);
    assert!(last.course_completed);
    assert_eq!(last.course_skills_awarded.len(), 1);
    assert_eq!(last.course_skills_awarded[0].code, "C1");
    assert_eq!(last.course_skills_awarded[0].new_total_points, 10);
    assert_eq!(last.progress.stage, ModuleStage::Complete);

    assert!(fx
        .store
        .course_completion_get(user, fx.course.course_id)
        .await
        .unwrap()
        .is_some());

    // A completed module refuses further actions, so nothing is awarded twice.
    let err = fx
        .engine
        .skip_stage(user, empty, ModuleStage::Test)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict { .. }));

    let ledger = fx.store.ledger_entries(user, None).await.unwrap();
    assert_eq!(ledger.len(), 2);
    let aggregates = fx.store.skill_aggregate_list(user).await.unwrap();
    assert_aggregates_match_ledger(&aggregates, &ledger);
    assert!(fx.engine.audit_ledger(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn resume_after_pre_test_lands_on_video() {
    let fx = CatalogFixture::new();
    let user = UserId::now_v7();
    let id = fx.full_module.module_id;

    fx.engine
        .submit_module_quiz(user, id, QuizType::PreTest, vec![0, 1, 2, 0, 1])
        .await
        .unwrap();

    let view = fx.engine.module_progress(user, id).await.unwrap();
    assert_eq!(view.stage, ModuleStage::Video);
    assert_eq!(view.pre_test_score, Some(3));
    assert_eq!(view.pre_test_total, Some(5));
    assert!(!view.video_completed);
}

#[tokio::test]
async fn profile_reflects_all_sources() {
    let fx = CatalogFixture::new();
    let user = fx.joined_user();
    fx.engine
        .self_check_in(user, fx.activity.activity_id)
        .await
        .unwrap();

    let profile = fx.engine.skill_profile(user).await.unwrap();
    let totals: Vec<_> = profile
        .iter()
        .map(|p| (p.skill.code.as_str(), p.total_points, p.level))
        .collect();
    assert_eq!(totals, vec![("C1", 5, 1), ("C2", 0, 0), ("C3", 3, 1)]);

    let history = fx
        .engine
        .ledger_history(user, Some(fx.c3.skill_id))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].points, 3);
}
