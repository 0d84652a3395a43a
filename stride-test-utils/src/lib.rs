//! STRIDE Test Utilities
//!
//! Centralized test infrastructure for the STRIDE workspace:
//! - Proptest generators for ids, grants, quizzes and award sequences
//! - A seeded catalog fixture over the in-memory store
//! - Assertions for ledger consistency

// Re-export the in-memory store from its source crate
pub use stride_storage::MemoryStore;

pub use stride_core::{
    Activity, ActivityId, Course, CourseId, EntityIdType, Grant, GrantSource, LedgerEntry, Module,
    ModuleId, QuizQuestion, QuizType, SkillAggregate, SkillDefinition, SkillId, Timestamp, UserId,
};
pub use stride_engine::{FakeClock, LearningEngine};

use chrono::{TimeZone, Utc};
use uuid::Uuid;

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating STRIDE values.

    use super::*;
    use proptest::prelude::*;

    /// Generate a random UUID (for generic ID generation).
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        arb_uuid().prop_map(UserId::new)
    }

    pub fn arb_skill_id() -> impl Strategy<Value = SkillId> {
        arb_uuid().prop_map(SkillId::new)
    }

    /// Generate a Timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    /// Generate a grant source of any kind.
    pub fn arb_grant_source() -> impl Strategy<Value = GrantSource> {
        prop_oneof![
            arb_uuid().prop_map(|id| GrantSource::Activity(id.into())),
            arb_uuid().prop_map(|id| GrantSource::Module(id.into())),
            arb_uuid().prop_map(|id| GrantSource::Course(id.into())),
        ]
    }

    /// Generate a point value as configured on a grant.
    pub fn arb_points() -> impl Strategy<Value = i32> {
        0i32..=50
    }

    /// Generate a question with 2 to 5 options and a valid correct index.
    pub fn arb_question() -> impl Strategy<Value = QuizQuestion> {
        (2usize..=5)
            .prop_flat_map(|options| (Just(options), 0..options as i32))
            .prop_map(|(options, correct_index)| QuizQuestion {
                prompt: "Which option is correct?".to_string(),
                options: (0..options).map(|o| format!("Option {}", o + 1)).collect(),
                correct_index,
            })
    }

    /// Generate a quiz together with a well-formed set of answers.
    pub fn arb_quiz_with_answers() -> impl Strategy<Value = (Vec<QuizQuestion>, Vec<i32>)> {
        prop::collection::vec(arb_question(), 1..10).prop_flat_map(|questions| {
            let answers: Vec<_> = questions
                .iter()
                .map(|q| 0..q.options.len() as i32)
                .collect();
            (Just(questions), answers)
        })
    }

    /// Generate a sequence of award requests as indexes into fixed pools of
    /// `users` learners and `sources` grant sources.
    pub fn arb_award_sequence(
        users: usize,
        sources: usize,
    ) -> impl Strategy<Value = Vec<(usize, usize)>> {
        prop::collection::vec((0..users, 0..sources), 0..40)
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    /// Fixed reference time all fixtures are anchored on.
    pub fn base_time() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn skill(code: &str, name: &str) -> SkillDefinition {
        SkillDefinition {
            skill_id: SkillId::now_v7(),
            code: code.to_string(),
            name: name.to_string(),
            color: "#6366f1".to_string(),
            description: None,
        }
    }

    /// Five four-option questions with correct answers `[0, 1, 2, 3, 0]`.
    pub fn five_question_quiz() -> Vec<QuizQuestion> {
        [0, 1, 2, 3, 0]
            .into_iter()
            .enumerate()
            .map(|(i, correct_index)| QuizQuestion {
                prompt: format!("Question {}", i + 1),
                options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
                correct_index,
            })
            .collect()
    }

    /// The correct answers for a module quiz.
    pub fn correct_answers(module: &Module, quiz_type: QuizType) -> Vec<i32> {
        module
            .questions(quiz_type)
            .iter()
            .map(|q| q.correct_index)
            .collect()
    }

    /// A seeded catalog on a [`MemoryStore`] with an engine on a fake clock.
    ///
    /// - skills C1, C2, C3
    /// - `activity`: window `base_time() .. +3h`, grants C1 = 5, C3 = 3
    /// - `course` with two modules:
    ///   - `full_module` has every stage, grants C2 = 4
    ///   - `empty_module` has no content and no grants
    ///   - the course grants C1 = 10
    /// - the clock starts 30 minutes into the activity window
    pub struct CatalogFixture {
        pub store: Arc<MemoryStore>,
        pub clock: FakeClock,
        pub engine: LearningEngine,
        pub c1: SkillDefinition,
        pub c2: SkillDefinition,
        pub c3: SkillDefinition,
        pub activity: Activity,
        pub course: Course,
        pub full_module: Module,
        pub empty_module: Module,
    }

    impl CatalogFixture {
        pub fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let c1 = skill("C1", "Critical thinking");
            let c2 = skill("C2", "Communication");
            let c3 = skill("C3", "Civic engagement");
            for s in [&c1, &c2, &c3] {
                seed(store.insert_skill(s.clone()));
            }

            let activity = Activity {
                activity_id: ActivityId::now_v7(),
                title: "Leadership workshop".to_string(),
                start_date: base_time(),
                end_date: Some(base_time() + Duration::hours(3)),
            };
            seed(store.insert_activity(activity.clone()));

            let course = Course {
                course_id: CourseId::now_v7(),
                title: "Foundations of leadership".to_string(),
            };
            seed(store.insert_course(course.clone()));

            let full_module = Module {
                module_id: ModuleId::now_v7(),
                course_id: course.course_id,
                title: "Listening well".to_string(),
                position: 1,
                pre_test: five_question_quiz(),
                video_url: Some("https://videos.example/listening.mp4".to_string()),
                test: five_question_quiz(),
            };
            let empty_module = Module {
                module_id: ModuleId::now_v7(),
                course_id: course.course_id,
                title: "Reflection".to_string(),
                position: 2,
                pre_test: Vec::new(),
                video_url: None,
                test: Vec::new(),
            };
            seed(store.insert_module(full_module.clone()));
            seed(store.insert_module(empty_module.clone()));

            let grants = [
                (GrantSource::Activity(activity.activity_id), &c1, 5),
                (GrantSource::Activity(activity.activity_id), &c3, 3),
                (GrantSource::Module(full_module.module_id), &c2, 4),
                (GrantSource::Course(course.course_id), &c1, 10),
            ];
            for (source, s, points) in grants {
                seed(store.insert_grant(Grant {
                    source,
                    skill_id: s.skill_id,
                    points,
                }));
            }

            let clock = FakeClock::new(base_time() + Duration::minutes(30));
            let engine = LearningEngine::with_clock(store.clone(), Arc::new(clock.clone()));

            Self {
                store,
                clock,
                engine,
                c1,
                c2,
                c3,
                activity,
                course,
                full_module,
                empty_module,
            }
        }

        /// A new learner who joined the fixture activity.
        pub fn joined_user(&self) -> UserId {
            let user = UserId::now_v7();
            seed(self.store.join_activity(
                user,
                self.activity.activity_id,
                base_time() - Duration::days(1),
            ));
            user
        }
    }

    impl Default for CatalogFixture {
        fn default() -> Self {
            Self::new()
        }
    }

    fn seed(result: stride_core::StrideResult<()>) {
        if let Err(err) = result {
            panic!("fixture seeding failed: {}", err);
        }
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for ledger invariants.

    use super::*;
    use stride_core::level_for_points;

    /// Assert every aggregate equals the sum of its ledger entries and
    /// carries the matching level.
    pub fn assert_aggregates_match_ledger(aggregates: &[SkillAggregate], ledger: &[LedgerEntry]) {
        for aggregate in aggregates {
            let sum: i64 = ledger
                .iter()
                .filter(|e| e.user_id == aggregate.user_id && e.skill_id == aggregate.skill_id)
                .map(|e| i64::from(e.points))
                .sum();
            assert_eq!(
                aggregate.total_points, sum,
                "aggregate for skill {} disagrees with its ledger",
                aggregate.skill_id
            );
            assert_eq!(
                aggregate.level,
                level_for_points(sum),
                "level for skill {} is stale",
                aggregate.skill_id
            );
        }
    }
}
