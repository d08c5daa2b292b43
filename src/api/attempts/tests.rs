use crate::db::models::{AnswerOption, CourseTest, Question, User};
use crate::db::types::{QuestionKind, SubjectStatus, TestStatus, UserRole};
use crate::repositories::course_tests::TestLimits;
use crate::test_support::{self, TestContext};
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

struct Fixture {
    student: User,
    test: CourseTest,
    single: (Question, Vec<AnswerOption>),
    multiple: (Question, Vec<AnswerOption>),
}

/// Enrolled student and a published test with a single choice question
/// (4, 5*, 6; 2 points) and a multiple choice one (1*, 2*, 3; 3 points).
async fn fixture(ctx: &TestContext, limits: TestLimits) -> Fixture {
    let db = ctx.state.db();
    let student =
        test_support::insert_user(db, "student@example.com", "Student", UserRole::Student).await;
    let group = test_support::insert_group(db, "G").await;
    test_support::assign_group(db, &student.id, &group.id).await;

    let subject = test_support::insert_subject(db, "Algebra", SubjectStatus::Published).await;
    test_support::enroll_group(db, &subject.id, &group.id).await;
    let test = test_support::insert_test(db, &subject.id, "Quiz", TestStatus::Published, limits).await;
    let single = test_support::insert_question(
        db,
        &test.id,
        QuestionKind::Single,
        2,
        &[("4", false), ("5", true), ("6", false)],
    )
    .await;
    let multiple = test_support::insert_question(
        db,
        &test.id,
        QuestionKind::Multiple,
        3,
        &[("1", true), ("2", true), ("3", false)],
    )
    .await;

    Fixture { student, test, single, multiple }
}

async fn start(ctx: &TestContext, token: &str, test_id: &str) -> (StatusCode, Value) {
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/tests/{test_id}/attempts"),
            Some(token),
            None,
        ))
        .await
        .expect("start attempt");
    let status = response.status();
    (status, test_support::read_json(response).await)
}

async fn submit(
    ctx: &TestContext,
    token: &str,
    attempt_id: &str,
    answers: &[(&str, Vec<&str>)],
) -> (StatusCode, Value) {
    let mut map = serde_json::Map::new();
    for (question_id, option_ids) in answers {
        map.insert(question_id.to_string(), json!(option_ids));
    }
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/attempts/{attempt_id}/submit"),
            Some(token),
            Some(json!({ "answers": map })),
        ))
        .await
        .expect("submit attempt");
    let status = response.status();
    (status, test_support::read_json(response).await)
}

#[tokio::test]
async fn second_start_resumes_open_attempt() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let fx = fixture(&ctx, test_support::no_limits()).await;
    let token = test_support::bearer_token(&fx.student, ctx.state.settings());

    let (status, first) = start(&ctx, &token, &fx.test.id).await;
    assert_eq!(status, StatusCode::CREATED, "response: {first}");
    assert_eq!(first["resumed"], false);

    let (status, second) = start(&ctx, &token, &fx.test.id).await;
    assert_eq!(status, StatusCode::OK, "response: {second}");
    assert_eq!(second["resumed"], true);
    assert_eq!(second["attempt_id"], first["attempt_id"]);

    let questions = first["questions"].as_array().expect("questions");
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[0]["id"], fx.single.0.id.as_str());
    for question in questions {
        for option in question["options"].as_array().expect("options") {
            assert!(option.get("is_correct").is_none(), "correctness must stay hidden");
        }
    }
}

#[tokio::test]
async fn concurrent_starts_share_one_attempt() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let fx = fixture(&ctx, test_support::no_limits()).await;
    let token = test_support::bearer_token(&fx.student, ctx.state.settings());

    let ((first_status, first), (second_status, second)) =
        tokio::join!(start(&ctx, &token, &fx.test.id), start(&ctx, &token, &fx.test.id));

    let mut statuses = vec![first_status, second_status];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CREATED]);
    assert_eq!(first["attempt_id"], second["attempt_id"]);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/tests/{}/attempts", fx.test.id),
            Some(&token),
            None,
        ))
        .await
        .expect("history");
    let history = test_support::read_json(response).await;
    assert_eq!(history["attempts"].as_array().expect("attempts").len(), 1);
}

#[tokio::test]
async fn submit_grades_exact_matches_and_is_idempotent() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let fx = fixture(&ctx, test_support::no_limits()).await;
    let token = test_support::bearer_token(&fx.student, ctx.state.settings());

    let (_, started) = start(&ctx, &token, &fx.test.id).await;
    let attempt_id = started["attempt_id"].as_str().expect("attempt id").to_string();

    let single_correct = fx.single.1[1].id.as_str();
    let (multi_a, multi_b) = (fx.multiple.1[0].id.as_str(), fx.multiple.1[1].id.as_str());
    let (status, result) = submit(
        &ctx,
        &token,
        &attempt_id,
        &[
            (fx.single.0.id.as_str(), vec![single_correct]),
            (fx.multiple.0.id.as_str(), vec![multi_b, multi_a]),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {result}");
    assert_eq!(result["score"], 5);
    assert_eq!(result["max_score"], 5);
    assert_eq!(result["late"], false);
    assert_eq!(result["already_completed"], false);
    assert_eq!(result["answers"].as_array().expect("answers").len(), 2);

    // A repeated submit with different answers changes nothing.
    let (status, again) =
        submit(&ctx, &token, &attempt_id, &[(fx.single.0.id.as_str(), vec![fx.single.1[0].id.as_str()])])
            .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["already_completed"], true);
    assert_eq!(again["score"], 5);
    assert_eq!(again["answers"].as_array().expect("answers").len(), 2);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/attempts/{attempt_id}/result"),
            Some(&token),
            None,
        ))
        .await
        .expect("result");
    assert_eq!(response.status(), StatusCode::OK);
    let stored = test_support::read_json(response).await;
    assert_eq!(stored["score"], 5);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/attempts/{attempt_id}"),
            Some(&token),
            None,
        ))
        .await
        .expect("screen of completed attempt");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn partial_and_foreign_selections_earn_nothing() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let fx = fixture(&ctx, test_support::no_limits()).await;
    let token = test_support::bearer_token(&fx.student, ctx.state.settings());

    let (_, started) = start(&ctx, &token, &fx.test.id).await;
    let attempt_id = started["attempt_id"].as_str().expect("attempt id").to_string();

    // The single choice question only gets an option of the other question.
    let (status, result) = submit(
        &ctx,
        &token,
        &attempt_id,
        &[
            (fx.single.0.id.as_str(), vec![fx.multiple.1[0].id.as_str()]),
            (fx.multiple.0.id.as_str(), vec![fx.multiple.1[0].id.as_str()]),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {result}");
    assert_eq!(result["score"], 0);
    let answers = result["answers"].as_array().expect("answers");
    assert_eq!(answers.len(), 1, "a selection of foreign options stores no answer");
    assert_eq!(answers[0]["question_id"], fx.multiple.0.id.as_str());
    assert_eq!(answers[0]["points_awarded"], 0);
}

#[tokio::test]
async fn attempt_cap_blocks_with_history_link() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let limits = TestLimits { days_to_complete: None, time_limit_minutes: None, max_attempts: Some(1) };
    let fx = fixture(&ctx, limits).await;
    let token = test_support::bearer_token(&fx.student, ctx.state.settings());

    let (_, started) = start(&ctx, &token, &fx.test.id).await;
    let attempt_id = started["attempt_id"].as_str().expect("attempt id").to_string();
    let (status, _) = submit(&ctx, &token, &attempt_id, &[]).await;
    assert_eq!(status, StatusCode::OK);

    let (status, blocked) = start(&ctx, &token, &fx.test.id).await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {blocked}");
    assert_eq!(blocked["detail"], "max attempts reached");
    assert_eq!(blocked["history_url"], format!("/api/v1/tests/{}/attempts", fx.test.id));

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/tests/{}/start-info", fx.test.id),
            Some(&token),
            None,
        ))
        .await
        .expect("start info");
    let info = test_support::read_json(response).await;
    assert_eq!(info["can_start"], false);
    assert_eq!(info["attempts_used"], 1);
    assert_eq!(info["attempts_left"], 0);
}

#[tokio::test]
async fn late_submission_scores_zero_after_grace() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let limits =
        TestLimits { days_to_complete: None, time_limit_minutes: Some(10), max_attempts: None };
    let fx = fixture(&ctx, limits).await;
    let token = test_support::bearer_token(&fx.student, ctx.state.settings());
    let answers = [(fx.single.0.id.as_str(), vec![fx.single.1[1].id.as_str()])];

    let (_, started) = start(&ctx, &token, &fx.test.id).await;
    let late_id = started["attempt_id"].as_str().expect("attempt id").to_string();
    test_support::backdate_attempt(ctx.state.db(), &late_id, 12, 0).await;
    let (status, late) = submit(&ctx, &token, &late_id, &answers).await;
    assert_eq!(status, StatusCode::OK, "response: {late}");
    assert_eq!(late["late"], true);
    assert_eq!(late["score"], 0);
    assert!(late["answers"].as_array().expect("answers").is_empty());

    let (_, started) = start(&ctx, &token, &fx.test.id).await;
    let grace_id = started["attempt_id"].as_str().expect("attempt id").to_string();
    assert_ne!(grace_id, late_id);
    test_support::backdate_attempt(ctx.state.db(), &grace_id, 10, 30).await;
    let (status, within_grace) = submit(&ctx, &token, &grace_id, &answers).await;
    assert_eq!(status, StatusCode::OK, "response: {within_grace}");
    assert_eq!(within_grace["late"], false);
    assert_eq!(within_grace["score"], 2);
}

#[tokio::test]
async fn late_flag_survives_time_limit_change() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let limits =
        TestLimits { days_to_complete: None, time_limit_minutes: Some(10), max_attempts: None };
    let fx = fixture(&ctx, limits).await;
    let token = test_support::bearer_token(&fx.student, ctx.state.settings());
    let admin =
        test_support::insert_user(ctx.state.db(), "admin@example.com", "Admin", UserRole::Admin)
            .await;
    let admin_token = test_support::bearer_token(&admin, ctx.state.settings());

    let (_, started) = start(&ctx, &token, &fx.test.id).await;
    let attempt_id = started["attempt_id"].as_str().expect("attempt id").to_string();
    test_support::backdate_attempt(ctx.state.db(), &attempt_id, 12, 0).await;
    let answers = [(fx.single.0.id.as_str(), vec![fx.single.1[1].id.as_str()])];
    let (status, _) = submit(&ctx, &token, &attempt_id, &answers).await;
    assert_eq!(status, StatusCode::OK);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/tests/{}", fx.test.id),
            Some(&admin_token),
            Some(json!({ "title": "Quiz", "time_limit_minutes": null })),
        ))
        .await
        .expect("update test");
    assert_eq!(response.status(), StatusCode::OK);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/attempts/{attempt_id}/result"),
            Some(&token),
            None,
        ))
        .await
        .expect("load result");
    assert_eq!(response.status(), StatusCode::OK);
    let result = test_support::read_json(response).await;
    assert_eq!(result["late"], true);
    assert_eq!(result["score"], 0);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/tests/{}/attempts", fx.test.id),
            Some(&token),
            None,
        ))
        .await
        .expect("attempt history");
    let history = test_support::read_json(response).await;
    assert_eq!(history["attempts"][0]["late"], true);
}

#[tokio::test]
async fn attempts_are_private_to_their_student() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let fx = fixture(&ctx, test_support::no_limits()).await;
    let db = ctx.state.db();
    let classmate =
        test_support::insert_user(db, "classmate@example.com", "Classmate", UserRole::Student).await;
    let teacher =
        test_support::insert_user(db, "teacher@example.com", "Teacher", UserRole::Teacher).await;
    let token = test_support::bearer_token(&fx.student, ctx.state.settings());

    let (_, started) = start(&ctx, &token, &fx.test.id).await;
    let attempt_id = started["attempt_id"].as_str().expect("attempt id").to_string();

    let classmate_token = test_support::bearer_token(&classmate, ctx.state.settings());
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/attempts/{attempt_id}"),
            Some(&classmate_token),
            None,
        ))
        .await
        .expect("foreign screen");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let (status, _) = submit(&ctx, &classmate_token, &attempt_id, &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = start(&ctx, &classmate_token, &fx.test.id).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "classmate is not enrolled");

    let teacher_token = test_support::bearer_token(&teacher, ctx.state.settings());
    let (status, _) = start(&ctx, &teacher_token, &fx.test.id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/attempts/{attempt_id}"),
            Some(&token),
            None,
        ))
        .await
        .expect("own screen");
    assert_eq!(response.status(), StatusCode::OK);
}
