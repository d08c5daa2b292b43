use crate::db::types::{QuestionKind, SubjectStatus, TestStatus, UserRole};
use crate::repositories;
use crate::test_support;
use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn invalid_questions_are_rejected() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let db = ctx.state.db();

    let admin = test_support::insert_user(db, "admin@example.com", "Admin", UserRole::Admin).await;
    let subject = test_support::insert_subject(db, "Algebra", SubjectStatus::Hidden).await;
    let test =
        test_support::insert_test(db, &subject.id, "Quiz", TestStatus::Draft, test_support::no_limits())
            .await;
    let token = test_support::bearer_token(&admin, ctx.state.settings());
    let uri = format!("/api/v1/tests/{}/questions", test.id);

    let invalid = [
        json!({
            "text": "2 + 3?",
            "kind": "single",
            "options": [{ "text": "5", "is_correct": true }, { "text": "five", "is_correct": true }]
        }),
        json!({
            "text": "Pick primes",
            "kind": "multiple",
            "options": [{ "text": "4" }, { "text": "6" }]
        }),
        json!({ "text": "   ", "kind": "single", "options": [{ "text": "a", "is_correct": true }] }),
        json!({ "text": "No options", "kind": "single", "options": [] }),
        json!({
            "text": "Too many points",
            "kind": "single",
            "points": 101,
            "options": [{ "text": "a", "is_correct": true }]
        }),
    ];

    for body in invalid {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(Method::POST, &uri, Some(&token), Some(body.clone())))
            .await
            .expect("create question");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "payload: {body}");
    }

    let response = ctx
        .app
        .oneshot(test_support::json_request(Method::GET, &uri, Some(&token), None))
        .await
        .expect("list questions");
    let listed = test_support::read_json(response).await;
    assert!(listed.as_array().expect("array").is_empty());
}

#[tokio::test]
async fn update_replaces_options_in_given_order() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let db = ctx.state.db();

    let teacher =
        test_support::insert_user(db, "teacher@example.com", "Teacher", UserRole::Teacher).await;
    let subject = test_support::insert_subject(db, "Algebra", SubjectStatus::Hidden).await;
    test_support::assign_teacher(db, &subject.id, &teacher.id).await;
    let test =
        test_support::insert_test(db, &subject.id, "Quiz", TestStatus::Draft, test_support::no_limits())
            .await;
    let token = test_support::bearer_token(&teacher, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/tests/{}/questions", test.id),
            Some(&token),
            Some(json!({
                "text": "2 + 3?",
                "kind": "single",
                "points": 2,
                "options": [
                    { "text": "4" },
                    { "text": "5", "is_correct": true },
                    { "text": "6" }
                ]
            })),
        ))
        .await
        .expect("create question");
    let status = response.status();
    let created = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::CREATED, "response: {created}");
    assert_eq!(created["order_index"], 0);
    assert_eq!(created["points"], 2);
    let texts: Vec<&str> = created["options"]
        .as_array()
        .expect("options")
        .iter()
        .filter_map(|o| o["text"].as_str())
        .collect();
    assert_eq!(texts, vec!["4", "5", "6"]);
    let question_id = created["id"].as_str().expect("question id").to_string();

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/questions/{question_id}"),
            Some(&token),
            Some(json!({
                "text": "Pick primes",
                "kind": "multiple",
                "points": 3,
                "options": [
                    { "text": "3", "is_correct": true },
                    { "text": "2", "is_correct": true },
                    { "text": "4" },
                    { "text": "9" }
                ]
            })),
        ))
        .await
        .expect("update question");
    let status = response.status();
    let updated = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {updated}");
    assert_eq!(updated["kind"], "multiple");
    assert_eq!(updated["points"], 3);
    let options = updated["options"].as_array().expect("options");
    assert_eq!(options.len(), 4);
    assert_eq!(options[0]["text"], "3");
    assert_eq!(options[0]["order_index"], 0);
    assert_eq!(options[3]["text"], "9");
    assert_eq!(options.iter().filter(|o| o["is_correct"] == true).count(), 2);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/tests/{}", test.id),
            Some(&token),
            None,
        ))
        .await
        .expect("get test");
    let body = test_support::read_json(response).await;
    assert_eq!(body["max_score"], 3);
}

#[tokio::test]
async fn deleting_question_closes_order_gap() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let db = ctx.state.db();

    let admin = test_support::insert_user(db, "admin@example.com", "Admin", UserRole::Admin).await;
    let subject = test_support::insert_subject(db, "Algebra", SubjectStatus::Hidden).await;
    let test =
        test_support::insert_test(db, &subject.id, "Quiz", TestStatus::Draft, test_support::no_limits())
            .await;
    let (first, _) =
        test_support::insert_question(db, &test.id, QuestionKind::Single, 1, &[("a", true)]).await;
    let (second, _) =
        test_support::insert_question(db, &test.id, QuestionKind::Single, 1, &[("b", true)]).await;
    let (third, _) =
        test_support::insert_question(db, &test.id, QuestionKind::Single, 1, &[("c", true)]).await;
    assert_eq!((first.order_index, second.order_index, third.order_index), (0, 1, 2));
    let token = test_support::bearer_token(&admin, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::DELETE,
            &format!("/api/v1/questions/{}", second.id),
            Some(&token),
            None,
        ))
        .await
        .expect("delete question");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/tests/{}/questions", test.id),
            Some(&token),
            None,
        ))
        .await
        .expect("list questions");
    let listed = test_support::read_json(response).await;
    let order: Vec<(String, i64)> = listed
        .as_array()
        .expect("array")
        .iter()
        .map(|q| {
            (
                q["id"].as_str().expect("id").to_string(),
                q["order_index"].as_i64().expect("order index"),
            )
        })
        .collect();
    assert_eq!(order, vec![(first.id, 0), (third.id, 1)]);
}

#[tokio::test]
async fn foreign_teacher_cannot_edit_questions() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let db = ctx.state.db();

    let stranger =
        test_support::insert_user(db, "stranger@example.com", "Stranger", UserRole::Teacher).await;
    let student =
        test_support::insert_user(db, "student@example.com", "Student", UserRole::Student).await;
    let subject = test_support::insert_subject(db, "Algebra", SubjectStatus::Hidden).await;
    let test =
        test_support::insert_test(db, &subject.id, "Quiz", TestStatus::Draft, test_support::no_limits())
            .await;
    let (question, _) =
        test_support::insert_question(db, &test.id, QuestionKind::Single, 1, &[("a", true)]).await;

    for user in [&stranger, &student] {
        let token = test_support::bearer_token(user, ctx.state.settings());
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &format!("/api/v1/questions/{}", question.id),
                Some(&token),
                None,
            ))
            .await
            .expect("get question");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    let token = test_support::bearer_token(&stranger, ctx.state.settings());
    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::DELETE,
            &format!("/api/v1/questions/{}", question.id),
            Some(&token),
            None,
        ))
        .await
        .expect("delete question");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn published_test_keeps_its_last_question() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let db = ctx.state.db();

    let admin = test_support::insert_user(db, "admin@example.com", "Admin", UserRole::Admin).await;
    let student =
        test_support::insert_user(db, "student@example.com", "Student", UserRole::Student).await;
    let group = test_support::insert_group(db, "G").await;
    test_support::assign_group(db, &student.id, &group.id).await;
    let subject = test_support::insert_subject(db, "Algebra", SubjectStatus::Published).await;
    test_support::enroll_group(db, &subject.id, &group.id).await;
    let test = test_support::insert_test(
        db,
        &subject.id,
        "Quiz",
        TestStatus::Published,
        test_support::no_limits(),
    )
    .await;
    let (first, _) =
        test_support::insert_question(db, &test.id, QuestionKind::Single, 1, &[("a", true)]).await;
    let (second, _) =
        test_support::insert_question(db, &test.id, QuestionKind::Single, 1, &[("b", true)]).await;
    let token = test_support::bearer_token(&admin, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::DELETE,
            &format!("/api/v1/questions/{}", first.id),
            Some(&token),
            None,
        ))
        .await
        .expect("delete first question");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::DELETE,
            &format!("/api/v1/questions/{}", second.id),
            Some(&token),
            None,
        ))
        .await
        .expect("delete last question");
    let status = response.status();
    let body = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {body}");

    let remaining = repositories::course_tests::count_questions(db, &test.id)
        .await
        .expect("count questions");
    assert_eq!(remaining, 1);

    let student_token = test_support::bearer_token(&student, ctx.state.settings());
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/tests/{}/attempts", test.id),
            Some(&student_token),
            None,
        ))
        .await
        .expect("start attempt");
    let status = response.status();
    let body = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::CREATED, "response: {body}");
    assert_eq!(body["questions"].as_array().expect("questions").len(), 1);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/tests/{}/status", test.id),
            Some(&token),
            Some(json!({ "status": "draft" })),
        ))
        .await
        .expect("draft test");
    assert_eq!(response.status(), StatusCode::OK);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::DELETE,
            &format!("/api/v1/questions/{}", second.id),
            Some(&token),
            None,
        ))
        .await
        .expect("delete question of draft test");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
