//! Send-time optimization — finds the hour of day with the best historical
//! open, click, or conversion rate.

use chrono::Timelike;
use notify_core::config::TimingConfig;
use notify_core::types::NotificationEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementMetric {
    Opens,
    Clicks,
    Conversions,
}

impl EngagementMetric {
    pub const ALL: [EngagementMetric; 3] = [
        EngagementMetric::Opens,
        EngagementMetric::Clicks,
        EngagementMetric::Conversions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementMetric::Opens => "opens",
            EngagementMetric::Clicks => "clicks",
            EngagementMetric::Conversions => "conversions",
        }
    }
}

impl fmt::Display for EngagementMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngagementMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "opens" | "open" => Ok(EngagementMetric::Opens),
            "clicks" | "click" => Ok(EngagementMetric::Clicks),
            "conversions" | "conversion" => Ok(EngagementMetric::Conversions),
            other => Err(format!("unknown engagement metric: {other}")),
        }
    }
}

/// Mean engagement rates for one send hour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyEngagement {
    pub hour: u32,
    pub sent: u64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub conversion_rate: f64,
}

impl HourlyEngagement {
    pub fn rate(&self, metric: EngagementMetric) -> f64 {
        match metric {
            EngagementMetric::Opens => self.open_rate,
            EngagementMetric::Clicks => self.click_rate,
            EngagementMetric::Conversions => self.conversion_rate,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct HourTally {
    sent: u64,
    opened: u64,
    clicked: u64,
    converted: u64,
}

#[derive(Debug, Clone)]
pub struct TimingOptimizer {
    /// Hours with at least one send, ascending.
    hourly: Vec<HourlyEngagement>,
    defaults: TimingConfig,
}

impl TimingOptimizer {
    pub fn fit(history: &[NotificationEvent], defaults: TimingConfig) -> Self {
        let mut tallies: [HourTally; 24] = Default::default();
        for event in history {
            let tally = &mut tallies[event.sent_at.hour() as usize];
            tally.sent += 1;
            tally.opened += u64::from(event.opened());
            tally.clicked += u64::from(event.clicked());
            tally.converted += u64::from(event.converted());
        }

        let hourly: Vec<HourlyEngagement> = tallies
            .iter()
            .enumerate()
            .filter(|(_, t)| t.sent > 0)
            .map(|(hour, t)| {
                let n = t.sent as f64;
                HourlyEngagement {
                    hour: hour as u32,
                    sent: t.sent,
                    open_rate: t.opened as f64 / n,
                    click_rate: t.clicked as f64 / n,
                    conversion_rate: t.converted as f64 / n,
                }
            })
            .collect();

        let optimizer = Self { hourly, defaults };
        if !optimizer.hourly.is_empty() {
            info!(
                opens = optimizer.optimal_hour(EngagementMetric::Opens),
                clicks = optimizer.optimal_hour(EngagementMetric::Clicks),
                conversions = optimizer.optimal_hour(EngagementMetric::Conversions),
                "Built send-time model"
            );
        }
        optimizer
    }

    pub fn empty(defaults: TimingConfig) -> Self {
        Self {
            hourly: Vec::new(),
            defaults,
        }
    }

    pub fn hourly(&self) -> &[HourlyEngagement] {
        &self.hourly
    }

    pub fn default_hour(&self, metric: EngagementMetric) -> u32 {
        match metric {
            EngagementMetric::Opens => self.defaults.default_open_hour,
            EngagementMetric::Clicks => self.defaults.default_click_hour,
            EngagementMetric::Conversions => self.defaults.default_conversion_hour,
        }
    }

    /// Hour with the highest mean rate; the earliest such hour on ties. Falls
    /// back to the configured default when there is no history.
    pub fn optimal_hour(&self, metric: EngagementMetric) -> u32 {
        self.hourly
            .iter()
            .fold(None::<&HourlyEngagement>, |best, h| match best {
                Some(b) if b.rate(metric) >= h.rate(metric) => Some(b),
                _ => Some(h),
            })
            .map(|h| h.hour)
            .unwrap_or_else(|| self.default_hour(metric))
    }
}

impl Default for TimingOptimizer {
    fn default() -> Self {
        Self::empty(TimingConfig::default())
    }
}
