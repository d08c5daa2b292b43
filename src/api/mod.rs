pub(crate) mod attempts;
pub(crate) mod auth;
pub(crate) mod errors;
pub(crate) mod groups;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod lectures;
pub(crate) mod pagination;
pub(crate) mod questions;
pub(crate) mod router;
pub(crate) mod subjects;
pub(crate) mod users;
pub(crate) mod validation;
