//! Per-account alert state machine.
//!
//! Escalation needs a tier strictly above the current one and always alerts.
//! While flagged, same-or-lower tier scores are muted until the suppression
//! window lapses; after that a repeat at the current tier re-alerts. Only a score
//! below the current tier's clear threshold returns the account to quiet.

use super::{Alert, Tier};
use crate::config::AlertConfig;
use crate::model::RiskScore;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct Track {
    tier: Tier,
    suppressed_until: Option<DateTime<Utc>>,
}

impl Default for Track {
    fn default() -> Self {
        Self {
            tier: Tier::Quiet,
            suppressed_until: None,
        }
    }
}

pub struct AlertEngine {
    config: AlertConfig,
    /// Flagged accounts only; absent means quiet. The entry guard is the
    /// per-account exclusion.
    tracks: DashMap<String, Track>,
}

impl AlertEngine {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            tracks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Feed one score through the account's state machine. `score.computed_at`
    /// is the clock for suppression.
    pub fn evaluate(&self, score: &RiskScore) -> Option<Alert> {
        if score.degraded && !self.config.escalate_on_degraded {
            debug!(transaction_id = %score.transaction_id, "degraded score; alert state unchanged");
            return None;
        }
        let now = score.computed_at;
        let observed = Tier::from_score(score.score, &self.config);

        let mut track = match self.tracks.entry(score.account_id.clone()) {
            Entry::Occupied(o) => o.into_ref(),
            Entry::Vacant(_) if observed == Tier::Quiet => return None,
            Entry::Vacant(v) => v.insert(Track::default()),
        };

        if observed > track.tier {
            let previous = track.tier;
            track.tier = observed;
            return Some(self.raise(&mut track, score, previous, now));
        }
        let Some(clear) = track.tier.clear_threshold(&self.config) else {
            return None;
        };
        if score.score < clear {
            info!(
                account_id = %score.account_id,
                from = ?track.tier,
                score = score.score,
                "account returned to quiet"
            );
            *track = Track::default();
            drop(track);
            self.tracks
                .remove_if(&score.account_id, |_, t| t.tier == Tier::Quiet);
            return None;
        }
        let lapsed = track.suppressed_until.map_or(true, |until| now >= until);
        if observed == track.tier && lapsed {
            let previous = track.tier;
            return Some(self.raise(&mut track, score, previous, now));
        }
        None
    }

    /// Operator acknowledgment: back to quiet with suppression cleared. Returns
    /// the tier the account was in.
    pub fn acknowledge(&self, account_id: &str) -> Option<Tier> {
        let (_, track) = self.tracks.remove(account_id)?;
        info!(account_id, from = ?track.tier, "alert acknowledged");
        Some(track.tier)
    }

    pub fn state_of(&self, account_id: &str) -> Tier {
        self.tracks
            .get(account_id)
            .map(|t| t.tier)
            .unwrap_or(Tier::Quiet)
    }

    /// Drop tracks whose suppression ended before `horizon`. The account is quiet
    /// again from then on; a repeat score re-alerts as a fresh escalation.
    pub fn expire_before(&self, horizon: DateTime<Utc>) -> usize {
        let mut expired = 0;
        self.tracks.retain(|_, t| {
            let keep = t.suppressed_until.is_some_and(|until| until >= horizon);
            if !keep {
                expired += 1;
            }
            keep
        });
        expired
    }

    fn raise(&self, track: &mut Track, score: &RiskScore, previous: Tier, now: DateTime<Utc>) -> Alert {
        let suppressed_until = now
            .checked_add_signed(self.config.suppression())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        track.suppressed_until = Some(suppressed_until);
        // severity() is Some for every tier above quiet
        let severity = track.tier.severity().unwrap_or(super::Severity::Watch);
        info!(
            account_id = %score.account_id,
            transaction_id = %score.transaction_id,
            severity = severity.as_str(),
            score = score.score,
            "alert raised"
        );
        Alert {
            alert_id: Uuid::new_v4().to_string(),
            account_id: score.account_id.clone(),
            transaction_id: score.transaction_id.clone(),
            severity,
            previous,
            score: score.score,
            reason_codes: score.reason_codes.iter().cloned().collect(),
            created_at: now,
            suppressed_until,
        }
    }
}
