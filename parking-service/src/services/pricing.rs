//! Pricing engine: rule matching, quote calculation and discount resolution.
//!
//! Everything here is pure: amounts are a function of the rule set, the
//! reference instant and the elapsed duration. Persistence happens elsewhere.

use crate::models::{DiscountType, PricingRule, RuleType, SessionDiscount};
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use uuid::Uuid;

/// The computed amount owed for a session at a given instant, pre-payment.
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub elapsed_minutes: i64,
    pub rule_id: Uuid,
    pub rule_type: RuleType,
    pub gross_amount: Decimal,
    pub discount_id: Option<Uuid>,
    pub discount_amount: Decimal,
    pub amount: Decimal,
}

/// Billable minutes between entry and exit. Started minutes count in full.
pub fn elapsed_minutes(
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
) -> Result<i64, AppError> {
    let seconds = (ended_at - started_at).num_seconds();
    if seconds < 0 {
        return Err(AppError::bad_request(format!(
            "ended_at {} precedes started_at {}",
            ended_at, started_at
        )));
    }
    Ok((seconds + 59) / 60)
}

fn rule_covers_instant(rule: &PricingRule, at: DateTime<Utc>) -> bool {
    // 0 = Sunday .. 6 = Saturday; empty set is a wildcard.
    let weekday = at.weekday().num_days_from_sunday() as i16;
    if !rule.days_of_week.is_empty() && !rule.days_of_week.contains(&weekday) {
        return false;
    }

    match (rule.start_time, rule.end_time) {
        (Some(start), Some(end)) => {
            let tod = at.time();
            if start <= end {
                tod >= start && tod < end
            } else {
                // Window wraps past midnight, e.g. 22:00-06:00.
                tod >= start || tod < end
            }
        }
        _ => true,
    }
}

fn rule_covers_duration(rule: &PricingRule, elapsed: i64) -> bool {
    elapsed >= i64::from(rule.min_duration_minutes)
        && rule
            .max_duration_minutes
            .map_or(true, |max| elapsed <= i64::from(max))
}

/// Select the single rule governing the given instant and elapsed duration.
///
/// Survivors are ordered by `priority` ascending, then by id as a
/// deterministic tie-break.
pub fn match_rule<'a>(
    rules: &'a [PricingRule],
    at: DateTime<Utc>,
    elapsed: i64,
) -> Result<&'a PricingRule, AppError> {
    rules
        .iter()
        .filter(|r| r.is_active)
        .filter(|r| rule_covers_instant(r, at))
        .filter(|r| rule_covers_duration(r, elapsed))
        .min_by_key(|r| (r.priority, r.rule_id))
        .ok_or_else(|| {
            AppError::NoApplicableRule(format!("no tariff covers {} elapsed minutes at {}", elapsed, at))
        })
}

fn price_per_min(rule: &PricingRule) -> Result<Decimal, AppError> {
    rule.price_per_min.ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "rule {} has no price_per_min",
            rule.rule_id
        ))
    })
}

fn time_based_amount(rule: &PricingRule, elapsed: i64) -> Result<Decimal, AppError> {
    let rate = price_per_min(rule)?;
    let raw = Decimal::from(elapsed) * rate;

    let amount = match rule.min_amount {
        Some(min_amount) if rule.min_amount_is_base && rate > Decimal::ZERO => {
            // The minimum buys a base window at the rule's own rate; beyond
            // it the per-minute rate resumes for the remainder.
            let base_minutes = (min_amount / rate).floor().to_i64().unwrap_or(0);
            if elapsed <= base_minutes {
                min_amount
            } else {
                min_amount + Decimal::from(elapsed - base_minutes) * rate
            }
        }
        Some(min_amount) => raw.max(min_amount),
        None => raw,
    };

    Ok(amount)
}

fn fixed_amount(rule: &PricingRule) -> Result<Decimal, AppError> {
    rule.fixed_price.ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("rule {} has no fixed_price", rule.rule_id))
    })
}

/// Graduated tariffs are the GRADUATED rules of one profile with contiguous
/// duration windows. The amount is the sum, over every tier the elapsed
/// duration has entered, of that tier's rate times the minutes spent in it.
fn graduated_amount(
    rules: &[PricingRule],
    matched: &PricingRule,
    elapsed: i64,
) -> Result<Decimal, AppError> {
    let mut tiers: Vec<&PricingRule> = rules
        .iter()
        .filter(|r| r.is_active)
        .filter(|r| r.profile_id == matched.profile_id)
        .filter(|r| r.rule_type() == RuleType::Graduated)
        .collect();
    tiers.sort_by_key(|r| (r.min_duration_minutes, r.rule_id));

    let mut amount = Decimal::ZERO;
    for tier in tiers {
        let tier_start = i64::from(tier.min_duration_minutes);
        if elapsed <= tier_start {
            continue;
        }
        let tier_end = tier
            .max_duration_minutes
            .map_or(elapsed, |max| elapsed.min(i64::from(max)));
        let minutes_in_tier = tier_end - tier_start;
        if minutes_in_tier > 0 {
            amount += Decimal::from(minutes_in_tier) * price_per_min(tier)?;
        }
    }

    if let Some(min_amount) = matched.min_amount {
        amount = amount.max(min_amount);
    }

    Ok(amount)
}

/// Gross amount for the matched rule, before any discount. Applies the
/// rule's `daily_max_amount` cap.
pub fn compute_gross(
    rules: &[PricingRule],
    matched: &PricingRule,
    elapsed: i64,
) -> Result<Decimal, AppError> {
    let amount = match matched.rule_type() {
        RuleType::Fixed => fixed_amount(matched)?,
        RuleType::TimeBased => time_based_amount(matched, elapsed)?,
        RuleType::Graduated => graduated_amount(rules, matched, elapsed)?,
    };

    let amount = match matched.daily_max_amount {
        Some(cap) => amount.min(cap),
        None => amount,
    };

    Ok(amount)
}

/// Pick the discount to apply, if any. At most one discount per quote.
///
/// The input slice is expected to hold only active discounts whose validity
/// window contains the reference instant. Coded discounts apply only when
/// the caller supplies the code; codeless ones auto-apply by priority.
pub fn select_discount<'a>(
    discounts: &'a [SessionDiscount],
    code: Option<&str>,
) -> Result<Option<&'a SessionDiscount>, AppError> {
    match code {
        Some(code) => {
            let discount = discounts
                .iter()
                .find(|d| d.code.as_deref() == Some(code))
                .ok_or_else(|| {
                    AppError::bad_request(format!("Unknown or expired discount code: {}", code))
                })?;
            Ok(Some(discount))
        }
        None => Ok(discounts
            .iter()
            .filter(|d| d.code.is_none())
            .min_by_key(|d| (d.priority, d.discount_id))),
    }
}

/// Apply one discount to a gross amount.
pub fn apply_discount(discount: &SessionDiscount, gross: Decimal, elapsed: i64) -> Decimal {
    let amount = match discount.discount_type() {
        DiscountType::Amount => {
            let mut value = discount.value.unwrap_or(Decimal::ZERO);
            if let Some(cap) = discount.max_amount {
                value = value.min(cap);
            }
            (gross - value).max(Decimal::ZERO)
        }
        DiscountType::Percentage => {
            let pct = discount.value.unwrap_or(Decimal::ZERO);
            let mut cut = gross * pct / Decimal::from(100);
            if let Some(cap) = discount.max_amount {
                cut = cut.min(cap);
            }
            (gross - cut).max(Decimal::ZERO)
        }
        // Replaces the matched rule's rate entirely.
        DiscountType::PricingProfile => {
            Decimal::from(elapsed) * discount.minute_value.unwrap_or(Decimal::ZERO)
        }
    };

    match discount.min_amount {
        Some(floor) => amount.max(floor),
        None => amount,
    }
}

/// Full quote pipeline: match a rule, compute the gross amount, resolve and
/// apply a discount. Pure and side-effect free; callable any number of times.
#[allow(clippy::too_many_arguments)]
pub fn build_quote(
    session_id: Uuid,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    rules: &[PricingRule],
    discounts: &[SessionDiscount],
    discount_code: Option<&str>,
) -> Result<Quote, AppError> {
    let elapsed = elapsed_minutes(started_at, ended_at)?;
    let matched = match_rule(rules, ended_at, elapsed)?;
    let gross = compute_gross(rules, matched, elapsed)?;

    let discount = select_discount(discounts, discount_code)?;
    let net = match discount {
        Some(d) => apply_discount(d, gross, elapsed),
        None => gross,
    };

    Ok(Quote {
        session_id,
        started_at,
        ended_at,
        elapsed_minutes: elapsed,
        rule_id: matched.rule_id,
        rule_type: matched.rule_type(),
        gross_amount: gross.round_dp(2),
        discount_id: discount.map(|d| d.discount_id),
        discount_amount: (gross - net).round_dp(2),
        amount: net.round_dp(2),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn rule(rule_type: RuleType) -> PricingRule {
        PricingRule {
            rule_id: Uuid::new_v4(),
            profile_id: Uuid::nil(),
            rule_type: rule_type.as_str().to_string(),
            min_duration_minutes: 0,
            max_duration_minutes: None,
            daily_max_amount: None,
            min_amount: None,
            min_amount_is_base: false,
            price_per_min: None,
            fixed_price: None,
            days_of_week: vec![],
            start_time: None,
            end_time: None,
            priority: 100,
            is_active: true,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    fn time_based(price: &str) -> PricingRule {
        let mut r = rule(RuleType::TimeBased);
        r.price_per_min = Some(dec(price));
        r
    }

    // Tuesday 2025-06-10 15:00 UTC
    fn tuesday_afternoon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 15, 0, 0).unwrap()
    }

    #[test]
    fn minimum_floors_short_stays() {
        // price_per_min=100, min_amount=500, cap=5000, 3 min -> max(300, 500)
        let mut r = time_based("100");
        r.min_amount = Some(dec("500"));
        r.daily_max_amount = Some(dec("5000"));

        let amount = compute_gross(std::slice::from_ref(&r), &r, 3).unwrap();
        assert_eq!(amount, dec("500"));
    }

    #[test]
    fn daily_cap_clamps_long_stays() {
        let mut r = time_based("100");
        r.min_amount = Some(dec("500"));
        r.daily_max_amount = Some(dec("5000"));

        let amount = compute_gross(std::slice::from_ref(&r), &r, 60).unwrap();
        assert_eq!(amount, dec("5000"));
    }

    #[test]
    fn fixed_price_ignores_duration() {
        let mut r = rule(RuleType::Fixed);
        r.fixed_price = Some(dec("1500"));
        r.max_duration_minutes = Some(120);

        for elapsed in [0, 1, 60, 120] {
            let amount = compute_gross(std::slice::from_ref(&r), &r, elapsed).unwrap();
            assert_eq!(amount, dec("1500"));
        }
    }

    #[test]
    fn base_minimum_adds_per_minute_charge_beyond_base_window() {
        // 500 buys 5 minutes at 100/min; minute 6 onwards bills per minute.
        let mut r = time_based("100");
        r.min_amount = Some(dec("500"));
        r.min_amount_is_base = true;

        assert_eq!(compute_gross(std::slice::from_ref(&r), &r, 3).unwrap(), dec("500"));
        assert_eq!(compute_gross(std::slice::from_ref(&r), &r, 5).unwrap(), dec("500"));
        assert_eq!(
            compute_gross(std::slice::from_ref(&r), &r, 10).unwrap(),
            dec("1000")
        );
    }

    #[test]
    fn graduated_sums_minutes_across_tiers() {
        let profile_id = Uuid::new_v4();
        let mut tier1 = rule(RuleType::Graduated);
        tier1.profile_id = profile_id;
        tier1.min_duration_minutes = 0;
        tier1.max_duration_minutes = Some(60);
        tier1.price_per_min = Some(dec("100"));
        let mut tier2 = rule(RuleType::Graduated);
        tier2.profile_id = profile_id;
        tier2.min_duration_minutes = 60;
        tier2.max_duration_minutes = None;
        tier2.price_per_min = Some(dec("50"));

        let rules = vec![tier1, tier2.clone()];

        // 90 min: 60 in tier one, 30 in tier two.
        let matched = match_rule(&rules, tuesday_afternoon(), 90).unwrap();
        assert_eq!(matched.rule_id, tier2.rule_id);
        assert_eq!(compute_gross(&rules, matched, 90).unwrap(), dec("7500"));

        // 30 min stays within the first tier.
        let matched = match_rule(&rules, tuesday_afternoon(), 30).unwrap();
        assert_eq!(compute_gross(&rules, matched, 30).unwrap(), dec("3000"));
    }

    #[test]
    fn matcher_prefers_lower_priority_then_lower_id() {
        let mut a = time_based("100");
        a.priority = 10;
        let mut b = time_based("200");
        b.priority = 5;
        let mut c = time_based("300");
        c.priority = 5;

        // Same priority: the lesser id wins, regardless of slice order.
        let (low, high) = if b.rule_id < c.rule_id {
            (b.clone(), c.clone())
        } else {
            (c.clone(), b.clone())
        };

        let rules = vec![a, high, low.clone()];
        let matched = match_rule(&rules, tuesday_afternoon(), 10).unwrap();
        assert_eq!(matched.rule_id, low.rule_id);
    }

    #[test]
    fn matcher_skips_inactive_and_foreign_day_rules() {
        let mut sunday_only = time_based("100");
        sunday_only.days_of_week = vec![0];
        let mut inactive = time_based("200");
        inactive.is_active = false;
        let weekday = time_based("300");

        let rules = vec![sunday_only, inactive, weekday.clone()];
        let matched = match_rule(&rules, tuesday_afternoon(), 10).unwrap();
        assert_eq!(matched.rule_id, weekday.rule_id);
    }

    #[test]
    fn overnight_window_wraps_past_midnight() {
        let mut night = time_based("100");
        night.start_time = Some(NaiveTime::from_hms_opt(22, 0, 0).unwrap());
        night.end_time = Some(NaiveTime::from_hms_opt(6, 0, 0).unwrap());
        let rules = vec![night.clone()];

        let late = Utc.with_ymd_and_hms(2025, 6, 10, 23, 30, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2025, 6, 10, 5, 0, 0).unwrap();
        let noon = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();

        assert!(match_rule(&rules, late, 10).is_ok());
        assert!(match_rule(&rules, early, 10).is_ok());
        assert!(matches!(
            match_rule(&rules, noon, 10),
            Err(AppError::NoApplicableRule(_))
        ));
    }

    #[test]
    fn duration_window_bounds_are_inclusive() {
        let mut short = time_based("100");
        short.max_duration_minutes = Some(30);
        let rules = vec![short];

        assert!(match_rule(&rules, tuesday_afternoon(), 30).is_ok());
        assert!(matches!(
            match_rule(&rules, tuesday_afternoon(), 31),
            Err(AppError::NoApplicableRule(_))
        ));
    }

    fn discount(discount_type: DiscountType) -> SessionDiscount {
        SessionDiscount {
            discount_id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            code: None,
            discount_type: discount_type.as_str().to_string(),
            value: None,
            minute_value: None,
            max_amount: None,
            min_amount: None,
            priority: 100,
            valid_from: None,
            valid_until: None,
            is_active: true,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    #[test]
    fn amount_discount_is_capped_and_never_negative() {
        let mut d = discount(DiscountType::Amount);
        d.value = Some(dec("800"));
        d.max_amount = Some(dec("300"));

        assert_eq!(apply_discount(&d, dec("1000"), 10), dec("700"));

        d.max_amount = None;
        assert_eq!(apply_discount(&d, dec("500"), 10), Decimal::ZERO);
    }

    #[test]
    fn percentage_discount_respects_cap_and_floor() {
        let mut d = discount(DiscountType::Percentage);
        d.value = Some(dec("50"));

        assert_eq!(apply_discount(&d, dec("1000"), 10), dec("500"));

        d.max_amount = Some(dec("200"));
        assert_eq!(apply_discount(&d, dec("1000"), 10), dec("800"));

        d.min_amount = Some(dec("900"));
        assert_eq!(apply_discount(&d, dec("1000"), 10), dec("900"));
    }

    #[test]
    fn pricing_profile_discount_replaces_the_rate() {
        let mut d = discount(DiscountType::PricingProfile);
        d.minute_value = Some(dec("20"));

        assert_eq!(apply_discount(&d, dec("9999"), 30), dec("600"));
    }

    #[test]
    fn coded_discounts_require_the_code() {
        let mut coded = discount(DiscountType::Percentage);
        coded.code = Some("RESIDENT".to_string());
        coded.value = Some(dec("50"));
        coded.priority = 1;
        let mut automatic = discount(DiscountType::Amount);
        automatic.value = Some(dec("100"));
        automatic.priority = 10;

        let discounts = vec![coded.clone(), automatic.clone()];

        let picked = select_discount(&discounts, None).unwrap().unwrap();
        assert_eq!(picked.discount_id, automatic.discount_id);

        let picked = select_discount(&discounts, Some("RESIDENT")).unwrap().unwrap();
        assert_eq!(picked.discount_id, coded.discount_id);

        assert!(select_discount(&discounts, Some("NOPE")).is_err());
    }

    #[test]
    fn quote_is_deterministic_for_identical_inputs() {
        let mut r = time_based("100");
        r.min_amount = Some(dec("500"));
        r.daily_max_amount = Some(dec("5000"));
        let rules = vec![r];

        let started = tuesday_afternoon();
        let ended = started + chrono::Duration::minutes(3);
        let session_id = Uuid::new_v4();

        let first = build_quote(session_id, started, ended, &rules, &[], None).unwrap();
        let second = build_quote(session_id, started, ended, &rules, &[], None).unwrap();

        assert_eq!(first.amount, second.amount);
        assert_eq!(first.rule_id, second.rule_id);
        assert_eq!(first.amount, dec("500"));
    }

    #[test]
    fn started_minutes_bill_in_full() {
        let started = tuesday_afternoon();
        assert_eq!(elapsed_minutes(started, started).unwrap(), 0);
        assert_eq!(
            elapsed_minutes(started, started + chrono::Duration::seconds(61)).unwrap(),
            2
        );
        assert!(elapsed_minutes(started, started - chrono::Duration::seconds(1)).is_err());
    }
}
