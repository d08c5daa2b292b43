pub(crate) mod attempts;
pub(crate) mod enrollment;
pub(crate) mod groups;
pub(crate) mod health;
pub(crate) mod lectures;
pub(crate) mod questions;
pub(crate) mod subjects;
pub(crate) mod users;
