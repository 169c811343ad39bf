//! Scheduled Job 固有の値

use crate::error::{FlowError, Result};
use crate::model::JobConfig;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(super) struct JobContext {
    pub retries: Option<u32>,
    pub timeout_seconds: Option<u64>,
}

pub(super) fn context(config: &JobConfig) -> Result<JobContext> {
    // Rule が参照するスケジュールは検証済みでも再確認する
    schedule(config)?;
    let timeout_seconds = config
        .timeout_seconds()
        .map_err(|message| FlowError::template("StateMachine", message))?;
    Ok(JobContext {
        retries: config.retries,
        timeout_seconds,
    })
}

/// `Schedule` パラメータの値
pub(super) fn schedule(config: &JobConfig) -> Result<String> {
    config
        .schedule_expression()
        .map_err(|message| FlowError::template("Rule", message))
}
