use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::services::publishing::{StatusChangeOutcome, UnmetCondition};

pub(crate) mod attempt;
pub(crate) mod auth;
pub(crate) mod group;
pub(crate) mod lecture;
pub(crate) mod question;
pub(crate) mod subject;
pub(crate) mod user;

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) service: &'static str,
    pub(crate) status: &'static str,
    pub(crate) components: BTreeMap<&'static str, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RootResponse {
    pub(crate) message: String,
    pub(crate) version: String,
    pub(crate) docs_url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusUpdate<S> {
    pub(crate) status: S,
}

/// Body of every status change; a rejection is a normal 200 response.
#[derive(Debug, Serialize)]
pub(crate) struct StatusChangeResponse {
    pub(crate) accepted: bool,
    pub(crate) status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) reason: Option<String>,
    pub(crate) unmet: Vec<UnmetCondition>,
}

impl StatusChangeResponse {
    /// `status` reports the label that now holds: the requested one when
    /// accepted, the unchanged current one otherwise.
    pub(crate) fn from_outcome(
        outcome: StatusChangeOutcome,
        requested: &str,
        current: &str,
    ) -> Option<Self> {
        match outcome {
            StatusChangeOutcome::Accepted => Some(Self {
                accepted: true,
                status: requested.to_string(),
                reason: None,
                unmet: Vec::new(),
            }),
            StatusChangeOutcome::Rejected(rejection) => Some(Self {
                accepted: false,
                status: current.to_string(),
                reason: Some(rejection.reason()),
                unmet: rejection.unmet,
            }),
            StatusChangeOutcome::NotFound => None,
        }
    }
}
