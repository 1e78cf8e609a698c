//! Critical override engine.
//!
//! Applies hard floors and deconfliction pauses on top of whatever the
//! scoring stage proposed. Runs once per tip, after scoring, and its output
//! is the final priority.

use serde::{Deserialize, Serialize};

use triage_agent::{
    Classification, MinorVictimStatus, OffenseCategory, PriorityScore, PriorityTier, TipLinks,
};

/// Minimum score for CSAM with a confirmed minor victim.
pub const CSAM_MINOR_FLOOR: u8 = 95;

/// Minimum score for a sextortion victim in crisis.
pub const SEXTORTION_CRISIS_FLOOR: u8 = 90;

/// A rule the engine can fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideRule {
    /// Another agency has an active investigation
    DeconflictionPause,
    /// `PAUSED` proposed with no active deconfliction match
    UnsupportedPause,
    CsamMinorFloor,
    SextortionCrisisFloor,
}

impl OverrideRule {
    /// Get description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::DeconflictionPause => "Active investigation at another agency",
            Self::UnsupportedPause => "Pause proposed without an active deconfliction match",
            Self::CsamMinorFloor => "CSAM with confirmed minor victim",
            Self::SextortionCrisisFloor => "Sextortion victim in crisis",
        }
    }
}

/// One rule that fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedOverride {
    pub rule: OverrideRule,
    /// Whether the rule altered the proposal
    pub changed: bool,
    pub detail: String,
}

/// Final priority plus the rules that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideOutcome {
    pub priority: PriorityScore,
    pub applied: Vec<AppliedOverride>,
}

impl OverrideOutcome {
    /// Whether any rule changed the proposal.
    pub fn changed(&self) -> bool {
        self.applied.iter().any(|a| a.changed)
    }

    /// Rules that fired, changed or not.
    pub fn rules(&self) -> Vec<OverrideRule> {
        self.applied.iter().map(|a| a.rule).collect()
    }
}

/// Add `reason` to the supervisor alert, keeping any earlier reason.
/// Returns whether anything changed.
fn raise_supervisor_alert(priority: &mut PriorityScore, reason: &str) -> bool {
    let present = priority
        .supervisor_alert_reason
        .as_deref()
        .is_some_and(|r| r.contains(reason));
    if priority.supervisor_alert && present {
        return false;
    }
    priority.supervisor_alert = true;
    if !present {
        priority.supervisor_alert_reason = Some(match priority.supervisor_alert_reason.take() {
            Some(existing) => format!("{}; {}", existing, reason),
            None => reason.to_string(),
        });
    }
    true
}

fn severity_floors(classification: &Classification) -> Vec<(OverrideRule, u8)> {
    let mut floors = Vec::new();
    if classification.offense_category == OffenseCategory::Csam
        && classification.minor_victim == MinorVictimStatus::Confirmed
    {
        floors.push((OverrideRule::CsamMinorFloor, CSAM_MINOR_FLOOR));
    }
    if classification.sextortion_victim_in_crisis {
        floors.push((OverrideRule::SextortionCrisisFloor, SEXTORTION_CRISIS_FLOOR));
    }
    floors
}

/// Apply critical overrides to a proposed priority.
///
/// - Severity floors raise the score to the highest applicable floor and
///   set `IMMEDIATE`. They never lower a score.
/// - An active deconfliction match sets `PAUSED` and a supervisor alert
///   naming the agency, appended to any earlier alert reason. The pause
///   beats every floor, but floors are still applied to the score.
/// - A proposed `PAUSED` with no active match is reset to the tier implied
///   by the score and raises a supervisor alert.
/// - `aig_csam_flag` is not an input to any rule, so it can never lower a
///   score.
///
/// Input that already satisfies every rule comes back unchanged.
pub fn apply_critical_overrides(
    classification: Option<&Classification>,
    links: Option<&TipLinks>,
    proposed: PriorityScore,
) -> OverrideOutcome {
    let mut priority = proposed;
    let mut applied = Vec::new();
    priority.score = priority.score.min(100);

    let agencies: Vec<&str> = links
        .map(|l| l.active_conflicts().map(|m| m.agency.as_str()).collect())
        .unwrap_or_default();
    let paused = !agencies.is_empty();

    // Only deconfliction may park a tip.
    if !paused && priority.tier == PriorityTier::Paused {
        let tier = PriorityTier::from_score(priority.score);
        priority.tier = tier;
        let rule = OverrideRule::UnsupportedPause;
        raise_supervisor_alert(&mut priority, rule.description());
        priority
            .scoring_factors
            .push(format!("Override: {} (tier reset to {})", rule.description(), tier.as_str()));
        applied.push(AppliedOverride {
            rule,
            changed: true,
            detail: format!("tier reset to {}", tier.as_str()),
        });
    }

    if let Some(classification) = classification {
        let floors = severity_floors(classification);
        let target = floors.iter().map(|(_, floor)| *floor).max();

        for (rule, floor) in &floors {
            let mut changed = false;
            // Only the highest floor moves the score.
            if Some(*floor) == target && priority.score < *floor {
                priority.score = *floor;
                changed = true;
            }
            if !paused && priority.tier != PriorityTier::Immediate {
                priority.tier = PriorityTier::Immediate;
                changed = true;
            }
            if *rule == OverrideRule::SextortionCrisisFloor && !priority.victim_crisis_alert {
                priority.victim_crisis_alert = true;
                changed = true;
            }
            if changed {
                priority
                    .scoring_factors
                    .push(format!("Override: {} (floor {})", rule.description(), floor));
            }
            applied.push(AppliedOverride {
                rule: *rule,
                changed,
                detail: format!("score floor {}", floor),
            });
        }
    }

    if paused {
        let reason = format!(
            "Active investigation at {}; deconflict before any action",
            agencies.join(", ")
        );
        let action = format!("Hold; contact {} before acting", agencies.join(", "));
        let mut changed = raise_supervisor_alert(&mut priority, &reason);
        if priority.tier != PriorityTier::Paused || priority.recommended_action != action {
            priority.tier = PriorityTier::Paused;
            priority.recommended_action = action;
            changed = true;
        }
        applied.push(AppliedOverride {
            rule: OverrideRule::DeconflictionPause,
            changed,
            detail: reason,
        });
    }

    OverrideOutcome { priority, applied }
}
