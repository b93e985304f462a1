//! Winner selection
//!
//! Given the eligible members of a cycle, per-tier settings and a mode,
//! produce an ordered winner list. Every random draw comes from one
//! `StdRng` seeded by the caller, and members are sorted by user id before
//! sampling, so the same seed and roster always give the same winners.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::payout;
use crate::error::{PayoutError, PayoutResult};
use crate::model::{EligibleMember, SelectionMode, Tier, UserId};

/// How many winners a tier gets and how they are paid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierSettings {
    /// Explicit number of winners; takes precedence over `winner_percentage`
    #[serde(default)]
    pub winner_count: Option<usize>,
    /// Share of the tier population to select, in percent
    #[serde(default)]
    pub winner_percentage: Option<f64>,
    /// Pool shared by the tier's winners, minor units
    #[serde(default)]
    pub tier_pool_size: i64,
    /// Percent of the tier pool paid to each winner
    #[serde(default)]
    pub payout_percentage: f64,
}

impl TierSettings {
    /// Winners requested from a tier of `population` members, before clamping
    pub fn requested(&self, population: usize) -> PayoutResult<usize> {
        if let Some(count) = self.winner_count {
            return Ok(count);
        }
        match self.winner_percentage {
            Some(pct) => {
                let micros = payout::percentage_to_micros(pct)?;
                Ok(payout::apply_percentage(population as i64, micros) as usize)
            }
            None => Ok(0),
        }
    }

    fn validate(&self) -> PayoutResult<()> {
        payout::payout_calculated(self.tier_pool_size, self.payout_percentage)?;
        if let Some(pct) = self.winner_percentage {
            payout::percentage_to_micros(pct)?;
        }
        Ok(())
    }
}

/// Input of one selection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRequest {
    pub mode: SelectionMode,
    #[serde(default)]
    pub tiers: BTreeMap<Tier, TierSettings>,
    /// Ordered member ids for manual mode
    #[serde(default)]
    pub custom_ids: Vec<UserId>,
    /// Seed for the random modes; the engine picks one when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SelectionRequest {
    pub fn new(mode: SelectionMode) -> Self {
        Self {
            mode,
            tiers: BTreeMap::new(),
            custom_ids: Vec::new(),
            seed: None,
        }
    }

    pub fn with_tier(mut self, tier: Tier, settings: TierSettings) -> Self {
        self.tiers.insert(tier, settings);
        self
    }

    pub fn with_custom_ids(mut self, ids: Vec<UserId>) -> Self {
        self.custom_ids = ids;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn settings(&self, tier: Tier) -> TierSettings {
        self.tiers.get(&tier).cloned().unwrap_or_default()
    }
}

/// A member chosen by a run, with ranks and the tier's payout terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedWinner {
    pub user_id: UserId,
    pub tier: Tier,
    pub overall_rank: u32,
    pub tier_rank: u32,
    pub points: u64,
    pub destination: Option<String>,
    pub tier_pool_size: i64,
    pub payout_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBreakdown {
    pub tier: Tier,
    pub eligible: usize,
    pub requested: usize,
    pub selected: usize,
    /// Requested winners the tier could not supply
    pub shortfall: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionOutcome {
    pub winners: Vec<SelectedWinner>,
    pub breakdown: Vec<TierBreakdown>,
    /// Seed the run used; `None` for deterministic modes
    pub seed: Option<u64>,
}

/// Run one selection over `members` using `seed` for any random draws
pub fn select_winners(
    members: &[EligibleMember],
    request: &SelectionRequest,
    seed: u64,
) -> PayoutResult<SelectionOutcome> {
    for settings in request.tiers.values() {
        settings.validate()?;
    }

    let by_tier = group_by_tier(members);
    let mut outcome = match request.mode {
        SelectionMode::Manual => select_manual(&by_tier, request)?,
        mode => select_by_tier(&by_tier, request, mode, seed)?,
    };
    outcome.seed = request.mode.is_random().then_some(seed);
    Ok(outcome)
}

/// Members per tier, sorted by user id, first occurrence wins on duplicates
fn group_by_tier(members: &[EligibleMember]) -> BTreeMap<Tier, Vec<&EligibleMember>> {
    let mut seen = HashSet::new();
    let mut by_tier: BTreeMap<Tier, Vec<&EligibleMember>> =
        Tier::ALL.iter().map(|t| (*t, Vec::new())).collect();
    for member in members {
        if seen.insert(&member.user_id) {
            by_tier.entry(member.tier).or_default().push(member);
        }
    }
    for tier_members in by_tier.values_mut() {
        tier_members.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    }
    by_tier
}

fn select_by_tier(
    by_tier: &BTreeMap<Tier, Vec<&EligibleMember>>,
    request: &SelectionRequest,
    mode: SelectionMode,
    seed: u64,
) -> PayoutResult<SelectionOutcome> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut winners = Vec::new();
    let mut breakdown = Vec::with_capacity(Tier::ALL.len());

    for tier in Tier::ALL {
        let population = by_tier.get(&tier).cloned().unwrap_or_default();
        let settings = request.settings(tier);
        let requested = settings.requested(population.len())?;
        let take = requested.min(population.len());

        let chosen = match mode {
            SelectionMode::WeightedRandom => weighted_sample(population.clone(), take, &mut rng),
            SelectionMode::TopPerformers => top_performers(population.clone(), take),
            SelectionMode::Random => uniform_sample(population.clone(), take, &mut rng),
            SelectionMode::Manual => {
                return Err(PayoutError::InvalidMode(
                    "manual selection takes an explicit member list".into(),
                ))
            }
        };

        breakdown.push(TierBreakdown {
            tier,
            eligible: population.len(),
            requested,
            selected: chosen.len(),
            shortfall: requested - chosen.len(),
        });

        for (i, member) in chosen.into_iter().enumerate() {
            winners.push(SelectedWinner {
                user_id: member.user_id.clone(),
                tier,
                overall_rank: winners.len() as u32 + 1,
                tier_rank: i as u32 + 1,
                points: member.points,
                destination: member.destination.clone(),
                tier_pool_size: settings.tier_pool_size,
                payout_percentage: settings.payout_percentage,
            });
        }
    }

    Ok(SelectionOutcome {
        winners,
        breakdown,
        seed: None,
    })
}

fn select_manual(
    by_tier: &BTreeMap<Tier, Vec<&EligibleMember>>,
    request: &SelectionRequest,
) -> PayoutResult<SelectionOutcome> {
    if request.custom_ids.is_empty() {
        return Err(PayoutError::InvalidRequest(
            "manual selection needs at least one member id".into(),
        ));
    }

    let index: BTreeMap<&UserId, &EligibleMember> = by_tier
        .values()
        .flatten()
        .map(|m| (&m.user_id, *m))
        .collect();

    let mut seen = HashSet::new();
    let mut offending = Vec::new();
    let mut chosen = Vec::with_capacity(request.custom_ids.len());
    for id in &request.custom_ids {
        match index.get(id) {
            Some(member) if seen.insert(id) => chosen.push(*member),
            _ => offending.push(id.clone()),
        }
    }
    if !offending.is_empty() {
        return Err(PayoutError::IneligibleMembers { user_ids: offending });
    }

    let mut tier_counts: BTreeMap<Tier, u32> = BTreeMap::new();
    let mut winners = Vec::with_capacity(chosen.len());
    for (i, member) in chosen.iter().enumerate() {
        let settings = request.settings(member.tier);
        let tier_rank = tier_counts.entry(member.tier).or_insert(0);
        *tier_rank += 1;
        winners.push(SelectedWinner {
            user_id: member.user_id.clone(),
            tier: member.tier,
            overall_rank: i as u32 + 1,
            tier_rank: *tier_rank,
            points: member.points,
            destination: member.destination.clone(),
            tier_pool_size: settings.tier_pool_size,
            payout_percentage: settings.payout_percentage,
        });
    }

    let breakdown = Tier::ALL
        .iter()
        .map(|tier| {
            let selected = tier_counts.get(tier).copied().unwrap_or(0) as usize;
            TierBreakdown {
                tier: *tier,
                eligible: by_tier.get(tier).map(Vec::len).unwrap_or(0),
                requested: selected,
                selected,
                shortfall: 0,
            }
        })
        .collect();

    Ok(SelectionOutcome {
        winners,
        breakdown,
        seed: None,
    })
}

/// Points descending, ties by user id ascending
fn top_performers(mut population: Vec<&EligibleMember>, take: usize) -> Vec<&EligibleMember> {
    population.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.user_id.cmp(&b.user_id)));
    population.truncate(take);
    population
}

fn uniform_sample<'a>(
    mut population: Vec<&'a EligibleMember>,
    take: usize,
    rng: &mut StdRng,
) -> Vec<&'a EligibleMember> {
    population.shuffle(rng);
    population.truncate(take);
    population
}

/// Draw without replacement with probability proportional to points.
/// Zero-point members are only drawn, uniformly, once every member with
/// points has been taken.
fn weighted_sample<'a>(
    population: Vec<&'a EligibleMember>,
    take: usize,
    rng: &mut StdRng,
) -> Vec<&'a EligibleMember> {
    let (mut weighted, mut zero): (Vec<_>, Vec<_>) =
        population.into_iter().partition(|m| m.points > 0);
    let mut picked = Vec::with_capacity(take);

    while picked.len() < take && !weighted.is_empty() {
        let total: u128 = weighted.iter().map(|m| m.points as u128).sum();
        let mut target = rng.random_range(0..total);
        let idx = weighted
            .iter()
            .position(|m| {
                let weight = m.points as u128;
                if target < weight {
                    true
                } else {
                    target -= weight;
                    false
                }
            })
            .unwrap_or(weighted.len() - 1);
        picked.push(weighted.remove(idx));
    }

    if picked.len() < take {
        zero.shuffle(rng);
        let missing = take - picked.len();
        picked.extend(zero.into_iter().take(missing));
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn member(id: &str, tier: Tier, points: u64) -> EligibleMember {
        EligibleMember {
            user_id: UserId::from(id),
            tier,
            points,
            destination: Some(format!("{}@example.com", id)),
        }
    }

    fn count(n: usize) -> TierSettings {
        TierSettings {
            winner_count: Some(n),
            tier_pool_size: 100_000,
            payout_percentage: 10.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_weighted_random_skips_zero_point_member() {
        let members = vec![
            member("a", Tier::Tier1, 10),
            member("b", Tier::Tier1, 0),
            member("c", Tier::Tier1, 5),
        ];
        let request =
            SelectionRequest::new(SelectionMode::WeightedRandom).with_tier(Tier::Tier1, count(2));

        for seed in 0..200 {
            let outcome = select_winners(&members, &request, seed).unwrap();
            let ids: Vec<&str> = outcome.winners.iter().map(|w| w.user_id.as_str()).collect();
            assert_eq!(ids.len(), 2);
            assert!(!ids.contains(&"b"), "seed {} picked zero-point member", seed);
        }
    }

    #[test]
    fn test_zero_point_members_fill_remaining_slots() {
        let members = vec![member("a", Tier::Tier1, 3), member("b", Tier::Tier1, 0)];
        let request =
            SelectionRequest::new(SelectionMode::WeightedRandom).with_tier(Tier::Tier1, count(2));
        let outcome = select_winners(&members, &request, 7).unwrap();
        let ids: Vec<&str> = outcome.winners.iter().map(|w| w.user_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_same_seed_same_winners() {
        let members: Vec<_> = (0..50)
            .map(|i| member(&format!("u{:02}", i), Tier::Tier2, (i % 7) as u64))
            .collect();
        let mut shuffled = members.clone();
        shuffled.reverse();
        let request = SelectionRequest::new(SelectionMode::Random).with_tier(Tier::Tier2, count(10));

        let first = select_winners(&members, &request, 42).unwrap();
        let second = select_winners(&shuffled, &request, 42).unwrap();
        assert_eq!(first.winners, second.winners);
        assert_eq!(first.seed, Some(42));
    }

    #[test]
    fn test_top_performers_breaks_ties_by_user_id() {
        let members = vec![
            member("c", Tier::Tier1, 50),
            member("b", Tier::Tier1, 80),
            member("a", Tier::Tier1, 50),
        ];
        let request =
            SelectionRequest::new(SelectionMode::TopPerformers).with_tier(Tier::Tier1, count(2));
        let outcome = select_winners(&members, &request, 0).unwrap();
        let ids: Vec<&str> = outcome.winners.iter().map(|w| w.user_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(outcome.seed, None);
    }

    #[test]
    fn test_ranks_follow_tier_order() {
        let members = vec![
            member("t3", Tier::Tier3, 1),
            member("t1a", Tier::Tier1, 9),
            member("t1b", Tier::Tier1, 8),
            member("t2", Tier::Tier2, 5),
        ];
        let request = SelectionRequest::new(SelectionMode::TopPerformers)
            .with_tier(Tier::Tier1, count(2))
            .with_tier(Tier::Tier2, count(1))
            .with_tier(Tier::Tier3, count(1));
        let outcome = select_winners(&members, &request, 0).unwrap();
        let ranks: Vec<(&str, u32, u32)> = outcome
            .winners
            .iter()
            .map(|w| (w.user_id.as_str(), w.overall_rank, w.tier_rank))
            .collect();
        assert_eq!(
            ranks,
            vec![("t1a", 1, 1), ("t1b", 2, 2), ("t2", 3, 1), ("t3", 4, 1)]
        );
    }

    #[test]
    fn test_shortfall_is_reported() {
        let members = vec![member("a", Tier::Tier1, 1)];
        let request = SelectionRequest::new(SelectionMode::Random)
            .with_tier(Tier::Tier1, count(3))
            .with_tier(Tier::Tier2, count(2));
        let outcome = select_winners(&members, &request, 1).unwrap();
        assert_eq!(outcome.winners.len(), 1);
        let tier1 = &outcome.breakdown[0];
        assert_eq!((tier1.requested, tier1.selected, tier1.shortfall), (3, 1, 2));
        let tier2 = &outcome.breakdown[1];
        assert_eq!((tier2.eligible, tier2.selected, tier2.shortfall), (0, 0, 2));
    }

    #[test]
    fn test_winner_percentage_rounds_half_up() {
        let settings = TierSettings {
            winner_percentage: Some(50.0),
            ..Default::default()
        };
        assert_eq!(settings.requested(5).unwrap(), 3);
        assert_eq!(settings.requested(4).unwrap(), 2);
        assert_eq!(settings.requested(0).unwrap(), 0);
    }

    #[test]
    fn test_manual_keeps_given_order() {
        let members = vec![
            member("a", Tier::Tier1, 1),
            member("b", Tier::Tier2, 1),
            member("c", Tier::Tier1, 1),
        ];
        let request = SelectionRequest::new(SelectionMode::Manual).with_custom_ids(vec![
            UserId::from("b"),
            UserId::from("c"),
            UserId::from("a"),
        ]);
        let outcome = select_winners(&members, &request, 0).unwrap();
        let ranks: Vec<(&str, u32, u32)> = outcome
            .winners
            .iter()
            .map(|w| (w.user_id.as_str(), w.overall_rank, w.tier_rank))
            .collect();
        assert_eq!(ranks, vec![("b", 1, 1), ("c", 2, 1), ("a", 3, 2)]);
    }

    #[test]
    fn test_manual_rejects_unknown_and_duplicate_ids() {
        let members = vec![member("a", Tier::Tier1, 1)];
        let request = SelectionRequest::new(SelectionMode::Manual).with_custom_ids(vec![
            UserId::from("a"),
            UserId::from("ghost"),
            UserId::from("a"),
        ]);
        match select_winners(&members, &request, 0).unwrap_err() {
            PayoutError::IneligibleMembers { user_ids } => {
                assert_eq!(user_ids, vec![UserId::from("ghost"), UserId::from("a")]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_invalid_tier_settings_are_rejected() {
        let request = SelectionRequest::new(SelectionMode::TopPerformers).with_tier(
            Tier::Tier1,
            TierSettings {
                winner_count: Some(1),
                payout_percentage: 120.0,
                ..Default::default()
            },
        );
        let err = select_winners(&[], &request, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPercentage);
    }

    #[test]
    fn test_empty_tier_yields_no_winners() {
        let request =
            SelectionRequest::new(SelectionMode::WeightedRandom).with_tier(Tier::Tier3, count(4));
        let outcome = select_winners(&[], &request, 9).unwrap();
        assert!(outcome.winners.is_empty());
    }
}
