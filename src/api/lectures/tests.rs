use crate::db::types::{LectureStatus, SubjectStatus, UserRole};
use crate::test_support;
use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn lecture_without_file_is_created_hidden_and_cannot_be_published() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let db = ctx.state.db();

    let teacher =
        test_support::insert_user(db, "teacher@example.com", "Teacher", UserRole::Teacher).await;
    let subject = test_support::insert_subject(db, "Algebra", SubjectStatus::Hidden).await;
    test_support::assign_teacher(db, &subject.id, &teacher.id).await;
    let token = test_support::bearer_token(&teacher, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::multipart_request(
            Method::POST,
            &format!("/api/v1/subjects/{}/lectures", subject.id),
            &token,
            &[("title", "  Week 1  ")],
            None,
        ))
        .await
        .expect("create lecture");

    let status = response.status();
    let created = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::CREATED, "response: {created}");
    assert_eq!(created["title"], "Week 1");
    assert_eq!(created["status"], "hidden");
    assert_eq!(created["has_file"], false);
    let lecture_id = created["id"].as_str().expect("lecture id").to_string();

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            &format!("/api/v1/lectures/{lecture_id}/status"),
            Some(&token),
            Some(json!({ "status": "published" })),
        ))
        .await
        .expect("publish lecture");
    let status = response.status();
    let body = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["accepted"], false);
    assert_eq!(body["status"], "hidden");
    assert_eq!(body["unmet"], json!(["lecture_has_no_file"]));

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/lectures/{lecture_id}/download"),
            Some(&token),
            None,
        ))
        .await
        .expect("download lecture");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn lecture_created_as_published_without_file_is_rejected() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let db = ctx.state.db();

    let admin = test_support::insert_user(db, "admin@example.com", "Admin", UserRole::Admin).await;
    let subject = test_support::insert_subject(db, "Algebra", SubjectStatus::Hidden).await;
    let token = test_support::bearer_token(&admin, ctx.state.settings());

    let response = ctx
        .app
        .oneshot(test_support::multipart_request(
            Method::POST,
            &format!("/api/v1/subjects/{}/lectures", subject.id),
            &token,
            &[("title", "Week 1"), ("status", "published")],
            None,
        ))
        .await
        .expect("create lecture");

    let status = response.status();
    let body = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");
    assert!(body["detail"].as_str().expect("detail").contains("no attached file"));
}

#[tokio::test]
async fn upload_checks_extension_size_and_storage() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let db = ctx.state.db();

    let admin = test_support::insert_user(db, "admin@example.com", "Admin", UserRole::Admin).await;
    let subject = test_support::insert_subject(db, "Algebra", SubjectStatus::Hidden).await;
    let token = test_support::bearer_token(&admin, ctx.state.settings());
    let uri = format!("/api/v1/subjects/{}/lectures", subject.id);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::multipart_request(
            Method::POST,
            &uri,
            &token,
            &[("title", "Installer")],
            Some(("setup.exe", b"MZ")),
        ))
        .await
        .expect("bad extension");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let oversized = vec![b'a'; 1024 * 1024 + 16];
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::multipart_request(
            Method::POST,
            &uri,
            &token,
            &[("title", "Huge")],
            Some(("huge.txt", &oversized)),
        ))
        .await
        .expect("oversized upload");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::multipart_request(
            Method::POST,
            &uri,
            &token,
            &[("title", "Notes")],
            Some(("notes.pdf", b"%PDF-1.4")),
        ))
        .await
        .expect("upload without storage");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            &uri,
            Some(&token),
            None,
        ))
        .await
        .expect("list lectures");
    let listed = test_support::read_json(response).await;
    assert!(listed.as_array().expect("array").is_empty(), "rejected uploads leave no rows");
}

#[tokio::test]
async fn students_only_see_published_lectures_of_published_subjects() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let db = ctx.state.db();

    let student =
        test_support::insert_user(db, "student@example.com", "Student", UserRole::Student).await;
    let group = test_support::insert_group(db, "G").await;
    test_support::assign_group(db, &student.id, &group.id).await;

    let published = test_support::insert_subject(db, "Algebra", SubjectStatus::Published).await;
    let draft = test_support::insert_subject(db, "Biology", SubjectStatus::Draft).await;
    test_support::enroll_group(db, &published.id, &group.id).await;
    test_support::enroll_group(db, &draft.id, &group.id).await;

    let visible =
        test_support::insert_lecture(db, &published.id, "Intro", LectureStatus::Published, true)
            .await;
    let hidden =
        test_support::insert_lecture(db, &published.id, "Draft", LectureStatus::Hidden, true).await;
    let in_draft_subject =
        test_support::insert_lecture(db, &draft.id, "Cells", LectureStatus::Published, true).await;

    let token = test_support::bearer_token(&student, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/lectures/{}", visible.id),
            Some(&token),
            None,
        ))
        .await
        .expect("get visible lecture");
    assert_eq!(response.status(), StatusCode::OK);

    for lecture_id in [&hidden.id, &in_draft_subject.id] {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                &format!("/api/v1/lectures/{lecture_id}"),
                Some(&token),
                None,
            ))
            .await
            .expect("get invisible lecture");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/subjects/{}/lectures", published.id),
            Some(&token),
            None,
        ))
        .await
        .expect("list lectures");
    let listed = test_support::read_json(response).await;
    let ids: Vec<&str> =
        listed.as_array().expect("array").iter().filter_map(|l| l["id"].as_str()).collect();
    assert_eq!(ids, vec![visible.id.as_str()]);

    let response = ctx
        .app
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/lectures/{}/download", visible.id),
            Some(&token),
            None,
        ))
        .await
        .expect("download without storage");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn teacher_renames_and_deletes_lecture() {
    let Some(ctx) = test_support::setup_test_context().await else {
        return;
    };
    let db = ctx.state.db();

    let teacher =
        test_support::insert_user(db, "teacher@example.com", "Teacher", UserRole::Teacher).await;
    let stranger =
        test_support::insert_user(db, "stranger@example.com", "Stranger", UserRole::Teacher).await;
    let subject = test_support::insert_subject(db, "Algebra", SubjectStatus::Hidden).await;
    test_support::assign_teacher(db, &subject.id, &teacher.id).await;
    let lecture =
        test_support::insert_lecture(db, &subject.id, "Intro", LectureStatus::Hidden, false).await;
    let uri = format!("/api/v1/lectures/{}", lecture.id);

    let stranger_token = test_support::bearer_token(&stranger, ctx.state.settings());
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PATCH,
            &uri,
            Some(&stranger_token),
            Some(json!({ "title": "Taken over" })),
        ))
        .await
        .expect("stranger rename");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let token = test_support::bearer_token(&teacher, ctx.state.settings());
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PATCH,
            &uri,
            Some(&token),
            Some(json!({ "title": "Introduction" })),
        ))
        .await
        .expect("rename");
    let status = response.status();
    let body = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["title"], "Introduction");

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::DELETE, &uri, Some(&token), None))
        .await
        .expect("delete");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = ctx
        .app
        .oneshot(test_support::json_request(Method::GET, &uri, Some(&token), None))
        .await
        .expect("get deleted");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
