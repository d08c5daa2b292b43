pub(crate) mod access;
pub(crate) mod attempts;
pub(crate) mod grading;
pub(crate) mod lectures;
pub(crate) mod publishing;
pub(crate) mod question_rules;
pub(crate) mod storage;
