//! Postgres-backed tests for the learning store.
//!
//! Compiled only with `--features db-tests`, so a plain `cargo test` skips
//! them. Run `cargo test -p stride-api --features db-tests --test db_tests`
//! against a database reachable through the `STRIDE_DB_*` variables; the
//! `db-tests` job in `.github/workflows/ci.yml` does so on every push.

#![cfg(feature = "db-tests")]

use chrono::{Duration, Utc};
use std::sync::Arc;
use stride_api::{DbClient, DbConfig};
use stride_core::{
    Activity, ActivityId, Course, CourseId, EntityIdType, Grant, GrantSource, Module, ModuleId,
    ModuleProgress, ModuleStage, SkillDefinition, SkillId, UserId,
};
use stride_engine::{EngineError, LearningEngine};
use stride_storage::{LearningStore, ProgressCommit, ProgressCommitOutcome};
use stride_test_utils::assertions::assert_aggregates_match_ledger;

async fn test_db() -> DbClient {
    let config = DbConfig::from_env().expect("valid STRIDE_DB_* configuration");
    let db = DbClient::from_config(&config).expect("pool");
    db.migrate().await.expect("schema applied");
    db
}

async fn seed_skill(db: &DbClient, code: &str) -> SkillDefinition {
    let skill = SkillDefinition {
        skill_id: SkillId::now_v7(),
        code: format!("{}-{}", code, SkillId::now_v7()),
        name: code.to_string(),
        color: "#10b981".to_string(),
        description: None,
    };
    db.upsert_skill(&skill).await.unwrap();
    skill
}

async fn seed_open_activity(db: &DbClient, grants: &[(&SkillDefinition, i32)]) -> ActivityId {
    let activity = Activity {
        activity_id: ActivityId::now_v7(),
        title: "Community clean-up".to_string(),
        start_date: Utc::now() - Duration::hours(1),
        end_date: Some(Utc::now() + Duration::hours(2)),
    };
    db.upsert_activity(&activity).await.unwrap();
    for (skill, points) in grants {
        db.upsert_grant(&Grant {
            source: GrantSource::Activity(activity.activity_id),
            skill_id: skill.skill_id,
            points: *points,
        })
        .await
        .unwrap();
    }
    activity.activity_id
}

#[tokio::test]
async fn db_check_in_awards_once() {
    let db = test_db().await;
    let c1 = seed_skill(&db, "C1").await;
    let c3 = seed_skill(&db, "C3").await;
    let activity = seed_open_activity(&db, &[(&c1, 5), (&c3, 3)]).await;
    let user = UserId::now_v7();
    db.join_activity(user, activity, Utc::now() - Duration::days(1))
        .await
        .unwrap();

    let engine = LearningEngine::new(Arc::new(db.clone()));
    let first = engine.self_check_in(user, activity).await.unwrap();
    assert_eq!(first.skills_awarded.len(), 2);

    let second = engine.self_check_in(user, activity).await.unwrap_err();
    assert!(matches!(
        second,
        EngineError::Conflict { checked_at: Some(at), .. } if at == first.checked_at
    ));

    let ledger = db.ledger_entries(user, None).await.unwrap();
    let aggregates = db.skill_aggregate_list(user).await.unwrap();
    assert_eq!(ledger.len(), 2);
    assert_aggregates_match_ledger(&aggregates, &ledger);
    assert!(engine.audit_ledger(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn db_concurrent_check_ins_award_once() {
    let db = test_db().await;
    let c1 = seed_skill(&db, "C1").await;
    let activity = seed_open_activity(&db, &[(&c1, 7)]).await;
    let user = UserId::now_v7();
    db.join_activity(user, activity, Utc::now()).await.unwrap();

    let engine = LearningEngine::new(Arc::new(db.clone()));
    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.self_check_in(user, activity).await })
        })
        .collect();

    let mut successes = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => successes += 1,
            Err(err) => assert_eq!(err.kind(), "conflict"),
        }
    }
    assert_eq!(successes, 1);

    let aggregates = db.skill_aggregate_list(user).await.unwrap();
    assert_eq!(aggregates.len(), 1);
    assert_eq!(aggregates[0].total_points, 7);
}

#[tokio::test]
async fn db_empty_module_completion_awards_module_and_course() {
    let db = test_db().await;
    let c2 = seed_skill(&db, "C2").await;
    let c1 = seed_skill(&db, "C1").await;

    let course = Course {
        course_id: CourseId::now_v7(),
        title: "Civic basics".to_string(),
    };
    db.upsert_course(&course).await.unwrap();
    let module = Module {
        module_id: ModuleId::now_v7(),
        course_id: course.course_id,
        title: "Orientation".to_string(),
        position: 1,
        pre_test: Vec::new(),
        video_url: None,
        test: Vec::new(),
    };
    db.upsert_module(&module).await.unwrap();
    for (source, skill, points) in [
        (GrantSource::Module(module.module_id), &c2, 4),
        (GrantSource::Course(course.course_id), &c1, 10),
    ] {
        db.upsert_grant(&Grant {
            source,
            skill_id: skill.skill_id,
            points,
        })
        .await
        .unwrap();
    }

    let engine = LearningEngine::new(Arc::new(db.clone()));
    let user = UserId::now_v7();
    engine
        .skip_stage(user, module.module_id, ModuleStage::PreTest)
        .await
        .unwrap();
    engine
        .skip_stage(user, module.module_id, ModuleStage::Video)
        .await
        .unwrap();
    let last = engine
        .skip_stage(user, module.module_id, ModuleStage::Test)
        .await
        .unwrap();
    assert!(last.module_completed);
    assert!(last.course_completed);

    let again = engine
        .skip_stage(user, module.module_id, ModuleStage::Test)
        .await
        .unwrap_err();
    assert_eq!(again.kind(), "conflict");

    let ledger = db.ledger_entries(user, None).await.unwrap();
    assert_eq!(ledger.len(), 2);
    let aggregates = db.skill_aggregate_list(user).await.unwrap();
    assert_aggregates_match_ledger(&aggregates, &ledger);
}

async fn seed_empty_module(db: &DbClient) -> Module {
    let course = Course {
        course_id: CourseId::now_v7(),
        title: "Budgeting".to_string(),
    };
    db.upsert_course(&course).await.unwrap();
    let module = Module {
        module_id: ModuleId::now_v7(),
        course_id: course.course_id,
        title: "Needs and wants".to_string(),
        position: 1,
        pre_test: Vec::new(),
        video_url: None,
        test: Vec::new(),
    };
    db.upsert_module(&module).await.unwrap();
    module
}

#[tokio::test]
async fn db_progress_commit_refuses_stale_snapshot() {
    let db = test_db().await;
    let module = seed_empty_module(&db).await;
    let user = UserId::now_v7();

    let commit_from = |expected: Option<ModuleProgress>, change: fn(&mut ModuleProgress)| {
        let mut progress = expected
            .clone()
            .unwrap_or_else(|| ModuleProgress::fresh(user, module.module_id, Utc::now()));
        change(&mut progress);
        ProgressCommit {
            expected,
            progress,
            attempt: None,
            course_id: module.course_id,
            now: Utc::now(),
        }
    };
    let skip_pre_test = |p: &mut ModuleProgress| {
        p.pre_test_score = Some(0);
        p.pre_test_total = Some(0);
    };

    // Two writers both start from the untouched module.
    let first = db
        .progress_commit(&commit_from(None, skip_pre_test))
        .await
        .unwrap();
    assert!(matches!(first, ProgressCommitOutcome::Committed(_)));
    let second = db
        .progress_commit(&commit_from(None, skip_pre_test))
        .await
        .unwrap();
    assert_eq!(second, ProgressCommitOutcome::Stale);

    let after_pre_test = db.module_progress_get(user, module.module_id).await.unwrap();
    let video = commit_from(after_pre_test, |p: &mut ModuleProgress| {
        p.video_completed = true
    });
    assert!(matches!(
        db.progress_commit(&video).await.unwrap(),
        ProgressCommitOutcome::Committed(_)
    ));
    let after_video = db.module_progress_get(user, module.module_id).await.unwrap();
    let scored = commit_from(after_video, |p: &mut ModuleProgress| {
        p.test_score = Some(1);
        p.test_total = Some(5);
    });
    db.progress_commit(&scored).await.unwrap();

    // Replaying the video write must not erase the recorded score.
    assert_eq!(
        db.progress_commit(&video).await.unwrap(),
        ProgressCommitOutcome::Stale
    );
    let stored = db
        .module_progress_get(user, module.module_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.test_score, Some(1));
}

#[tokio::test]
async fn db_aggregate_level_follows_total() {
    let db = test_db().await;
    let c4 = seed_skill(&db, "C4").await;
    let source = GrantSource::Module(ModuleId::now_v7());
    db.upsert_grant(&Grant {
        source,
        skill_id: c4.skill_id,
        points: 9,
    })
    .await
    .unwrap();
    let user = UserId::now_v7();

    for (total, level) in [(9, 1), (18, 2), (27, 3)] {
        let receipt = db.award(user, source, Utc::now()).await.unwrap();
        assert_eq!(receipt.skills[0].new_total_points, total);
        assert_eq!(receipt.skills[0].new_level, level);
        let stored = db.skill_aggregate_list(user).await.unwrap();
        assert_eq!(stored[0].total_points, total);
        assert_eq!(stored[0].level, level);
    }
}

#[tokio::test]
async fn db_health_check() {
    let db = test_db().await;
    db.health_check().await.unwrap();
    assert!(db.pool_size() >= 1);
}
