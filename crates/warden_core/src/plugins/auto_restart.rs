//! Scheduled restarts for wrapped game servers.
//!
//! A wrapper opts in through its init payload:
//!
//! ```toml
//! [auto_restart.daily]
//! from = "04:00"
//! to = "05:00"
//! ```
//!
//! From `from` onward the server is stopped as soon as its roster is empty;
//! at `to` it is stopped regardless. Both instants are computed as the next
//! occurrence after the wrapper connects, so a wrapper joining mid-window is
//! not restarted immediately. The watch task ends with the session.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime};
use serde_json::Value;
use tracing::{info, warn};

use warden_protocol::ListenerToken;

use crate::error::PluginError;
use crate::plane::ControlPlane;
use crate::plugins::{Plugin, PluginProvider};
use crate::sessions::WrapperSession;

const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Provider for the restart scheduler.
pub struct AutoRestartProvider;

impl PluginProvider for AutoRestartProvider {
    fn name(&self) -> &'static str {
        "auto_restart"
    }

    fn create(
        &self,
        plane: Arc<ControlPlane>,
        _token: ListenerToken,
        config: &Value,
    ) -> Result<Option<Box<dyn Plugin>>, PluginError> {
        let enabled = config
            .get("enabled")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if !enabled {
            return Ok(None);
        }
        Ok(Some(Box::new(AutoRestartPlugin { plane })))
    }
}

struct AutoRestartPlugin {
    plane: Arc<ControlPlane>,
}

impl Plugin for AutoRestartPlugin {
    fn on_wrapper_init(&self, wrapper: &Arc<WrapperSession>, payload: &Value) {
        let Some(daily) = payload.pointer("/auto_restart/daily") else {
            return;
        };
        let (Some(from), Some(to)) = (
            daily.get("from").and_then(Value::as_str),
            daily.get("to").and_then(Value::as_str),
        ) else {
            warn!(
                "Wrapper {} has an auto_restart section without from/to times",
                wrapper.uuid()
            );
            return;
        };
        let (Ok(from), Ok(to)) = (
            NaiveTime::parse_from_str(from, "%H:%M"),
            NaiveTime::parse_from_str(to, "%H:%M"),
        ) else {
            warn!(
                "Wrapper {} has unparseable auto_restart times: {from} / {to}",
                wrapper.uuid()
            );
            return;
        };

        let now = Local::now().naive_local();
        let window_start = next_on(now, from);
        let window_end = next_on(window_start, to);
        let name = self
            .plane
            .identities
            .get(&wrapper.uuid())
            .map(|identity| identity.name)
            .unwrap_or_else(|| wrapper.uuid().to_string());
        info!("Wrapper {name}: restart window {window_start} .. {window_end}");

        let wrapper = wrapper.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                ticker.tick().await;
                if wrapper.protocol().is_closed() {
                    return;
                }
                let now = Local::now().naive_local();
                if now < window_start {
                    continue;
                }
                if wrapper.players().is_empty() {
                    info!("Wrapper {}: restart window open and empty, stopping", wrapper.uuid());
                    wrapper.stop();
                    return;
                }
                if now >= window_end {
                    info!("Wrapper {}: restart window closing, stopping", wrapper.uuid());
                    wrapper.stop();
                    return;
                }
            }
        });
    }
}

fn next_on(after: NaiveDateTime, time: NaiveTime) -> NaiveDateTime {
    let mut candidate = after.date().and_time(time);
    while candidate <= after {
        candidate = candidate + chrono::Duration::days(1);
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn next_occurrence_is_later_today_when_possible() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_time(at(12, 0));
        let next = next_on(now, at(18, 30));
        assert_eq!(next.date(), now.date());
        assert_eq!(next.time(), at(18, 30));
    }

    #[test]
    fn next_occurrence_rolls_to_tomorrow_when_past() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_time(at(12, 0));
        let next = next_on(now, at(4, 0));
        assert_eq!(next.date(), now.date().succ_opt().unwrap());
        assert_eq!(next.time(), at(4, 0));
    }

    #[test]
    fn window_end_follows_window_start() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_time(at(23, 30));
        // Start rolls to tomorrow 04:00, end to tomorrow 05:00.
        let start = next_on(now, at(4, 0));
        let end = next_on(start, at(5, 0));
        assert!(start > now);
        assert!(end > start);
        assert_eq!(end - start, chrono::Duration::hours(1));
    }
}
