use sqlx::PgPool;

use crate::db::models::{Subject, User};
use crate::db::types::{LectureStatus, SubjectStatus, TestStatus, UserRole};
use crate::repositories;

/// The caller of a content operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Actor {
    pub(crate) id: String,
    pub(crate) roles: Vec<UserRole>,
}

impl Actor {
    pub(crate) fn from_user(user: &User) -> Self {
        Self { id: user.id.clone(), roles: vec![user.role] }
    }

    pub(crate) fn has_role(&self, role: UserRole) -> bool {
        self.roles.contains(&role)
    }

    pub(crate) fn is_admin(&self) -> bool {
        self.has_role(UserRole::Admin)
    }
}

/// What is being looked at inside a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContentItem {
    Subject,
    Lecture(LectureStatus),
    Test(TestStatus),
}

/// A content item together with the subject that owns it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ContentRef<'a> {
    pub(crate) subject: &'a Subject,
    pub(crate) item: ContentItem,
}

impl<'a> ContentRef<'a> {
    pub(crate) fn subject(subject: &'a Subject) -> Self {
        Self { subject, item: ContentItem::Subject }
    }

    pub(crate) fn lecture(subject: &'a Subject, status: LectureStatus) -> Self {
        Self { subject, item: ContentItem::Lecture(status) }
    }

    pub(crate) fn test(subject: &'a Subject, status: TestStatus) -> Self {
        Self { subject, item: ContentItem::Test(status) }
    }
}

/// Relationship of one actor to one subject, loaded from the enrollment store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SubjectFacts {
    pub(crate) teaches: bool,
    pub(crate) enrolled: bool,
}

pub(crate) fn can_manage_with(actor: &Actor, facts: SubjectFacts) -> bool {
    actor.is_admin() || (actor.has_role(UserRole::Teacher) && facts.teaches)
}

pub(crate) fn can_view_with(
    actor: &Actor,
    subject_status: SubjectStatus,
    item: ContentItem,
    facts: SubjectFacts,
) -> bool {
    if can_manage_with(actor, facts) {
        return true;
    }
    if !actor.has_role(UserRole::Student) || !facts.enrolled {
        return false;
    }

    let subject_published = subject_status == SubjectStatus::Published;
    match item {
        ContentItem::Subject => subject_published,
        ContentItem::Lecture(status) => subject_published && status == LectureStatus::Published,
        // Tests ignore the parent subject's own status.
        ContentItem::Test(status) => status == TestStatus::Published,
    }
}

/// Loads only the facts the actor's roles can make use of.
pub(crate) async fn load_facts(
    pool: &PgPool,
    actor: &Actor,
    subject_id: &str,
) -> Result<SubjectFacts, sqlx::Error> {
    let mut facts = SubjectFacts::default();
    if actor.is_admin() {
        return Ok(facts);
    }
    if actor.has_role(UserRole::Teacher) {
        facts.teaches =
            repositories::enrollment::is_subject_teacher(pool, subject_id, &actor.id).await?;
    }
    if actor.has_role(UserRole::Student) {
        facts.enrolled =
            repositories::enrollment::is_student_enrolled(pool, subject_id, &actor.id).await?;
    }
    Ok(facts)
}

pub(crate) async fn can_view(
    pool: &PgPool,
    actor: &Actor,
    content: ContentRef<'_>,
) -> Result<bool, sqlx::Error> {
    let facts = load_facts(pool, actor, &content.subject.id).await?;
    Ok(can_view_with(actor, content.subject.status, content.item, facts))
}

pub(crate) async fn can_manage(
    pool: &PgPool,
    actor: &Actor,
    subject_id: &str,
) -> Result<bool, sqlx::Error> {
    if actor.is_admin() {
        return Ok(true);
    }
    let facts = load_facts(pool, actor, subject_id).await?;
    Ok(can_manage_with(actor, facts))
}
