//! Segment classifier — an ordered decision list over a profile snapshot.

use chrono::{DateTime, Utc};
use notify_core::config::SegmentationConfig;
use notify_core::types::{Segment, UserProfile};

/// Inputs the decision list actually reads, in whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSignals {
    pub account_age_days: i64,
    pub inactive_days: i64,
    pub cart_size: usize,
    pub total_purchases: u32,
}

impl SegmentSignals {
    pub fn from_profile(profile: &UserProfile, now: DateTime<Utc>) -> Self {
        Self {
            account_age_days: (now - profile.created_at).num_days(),
            inactive_days: (now - profile.last_activity).num_days(),
            cart_size: profile.cart_items.len(),
            total_purchases: profile.total_purchases,
        }
    }
}

pub struct SegmentationEngine {
    config: SegmentationConfig,
}

impl SegmentationEngine {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    /// Evaluate the profile as of `now`. First matching rule wins.
    pub fn classify(&self, profile: &UserProfile, now: DateTime<Utc>) -> Segment {
        self.classify_signals(&SegmentSignals::from_profile(profile, now))
    }

    pub fn classify_signals(&self, s: &SegmentSignals) -> Segment {
        let c = &self.config;
        if s.account_age_days <= c.new_user_days {
            Segment::NewUser
        } else if s.inactive_days > c.inactive_days {
            Segment::InactiveUser
        } else if s.cart_size > 0 && s.inactive_days <= c.cart_recent_days {
            Segment::CartAbandoner
        } else if s.total_purchases >= c.vip_min_purchases {
            Segment::VipUser
        } else if s.total_purchases >= c.repeat_min_purchases {
            Segment::RepeatBuyer
        } else {
            Segment::ActiveUser
        }
    }
}

impl Default for SegmentationEngine {
    fn default() -> Self {
        Self::new(SegmentationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(age: i64, inactive: i64, cart: usize, purchases: u32) -> SegmentSignals {
        SegmentSignals {
            account_age_days: age,
            inactive_days: inactive,
            cart_size: cart,
            total_purchases: purchases,
        }
    }

    #[test]
    fn test_new_user_beats_vip() {
        let engine = SegmentationEngine::default();
        assert_eq!(engine.classify_signals(&signals(0, 0, 0, 15)), Segment::NewUser);
        assert_eq!(engine.classify_signals(&signals(7, 0, 2, 15)), Segment::NewUser);
    }

    #[test]
    fn test_inactive_before_cart() {
        let engine = SegmentationEngine::default();
        assert_eq!(engine.classify_signals(&signals(90, 31, 3, 0)), Segment::InactiveUser);
        assert_eq!(engine.classify_signals(&signals(90, 30, 0, 0)), Segment::ActiveUser);
    }

    #[test]
    fn test_cart_abandoner_requires_recent_activity() {
        let engine = SegmentationEngine::default();
        assert_eq!(engine.classify_signals(&signals(30, 1, 1, 12)), Segment::CartAbandoner);
        assert_eq!(engine.classify_signals(&signals(30, 2, 1, 12)), Segment::VipUser);
    }

    #[test]
    fn test_purchase_tiers() {
        let engine = SegmentationEngine::default();
        assert_eq!(engine.classify_signals(&signals(30, 5, 0, 10)), Segment::VipUser);
        assert_eq!(engine.classify_signals(&signals(30, 5, 0, 9)), Segment::RepeatBuyer);
        assert_eq!(engine.classify_signals(&signals(30, 5, 0, 3)), Segment::RepeatBuyer);
        assert_eq!(engine.classify_signals(&signals(30, 5, 0, 2)), Segment::ActiveUser);
    }

    #[test]
    fn test_total_over_signal_grid() {
        let engine = SegmentationEngine::default();
        for age in [0, 7, 8, 400] {
            for inactive in [0, 1, 2, 30, 31] {
                for cart in [0, 1] {
                    for purchases in [0, 3, 10] {
                        let segment = engine.classify_signals(&signals(age, inactive, cart, purchases));
                        assert!(Segment::ALL.contains(&segment));
                    }
                }
            }
        }
    }
}
