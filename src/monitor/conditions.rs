//! Stateless condition evaluators.
//!
//! Every evaluator returns a verdict plus a human-readable explanation that
//! embeds both the live value and the threshold. Malformed conditions and
//! missing market data are reported as "not met" with a diagnostic instead of
//! an error, so one bad condition cannot stall evaluation of other orders.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::monitor::types::{
    BookingOrder, Comparison, Condition, LogicType, MarketCondition, OrderId, Price,
    PriceCondition, PriceTick, PriceTrigger, TimeCondition, TimeMode,
};
use crate::utils::{format_amount, format_price};

/// Relative tolerance used by the `equals` market comparison.
pub const EQUALS_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionResult {
    pub condition_type: String,
    pub met: bool,
    pub details: String,
}

impl ConditionResult {
    fn new(condition_type: &str, met: bool, details: String) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            met,
            details,
        }
    }
}

/// Snapshot of everything an order's conditions may look at.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub tick: Option<PriceTick>,
    pub now: DateTime<Utc>,
}

impl EvaluationContext {
    pub fn new(tick: Option<PriceTick>, now: DateTime<Utc>) -> Self {
        Self { tick, now }
    }

    pub fn price(&self) -> Option<Price> {
        self.tick.as_ref().map(|tick| tick.price)
    }
}

/// Full evaluation of one order: every condition plus the combined verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvaluation {
    pub order_id: OrderId,
    pub logic: LogicType,
    pub should_execute: bool,
    pub results: Vec<ConditionResult>,
    pub price: Option<Price>,
    pub evaluated_at: DateTime<Utc>,
}

/// Effective time window after resolving direct or relative mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        match (self.start, self.end) {
            (None, None) => true,
            (Some(start), None) => now >= start,
            (None, Some(end)) => now <= end,
            (Some(start), Some(end)) => start <= now && now <= end,
        }
    }
}

pub fn evaluate_price(condition: &PriceCondition, current_price: Price) -> ConditionResult {
    let (met, details) = match condition.trigger_type {
        PriceTrigger::Above => {
            let met = current_price > condition.price;
            (
                met,
                format!(
                    "price {} > {} (above): {}",
                    format_price(current_price),
                    format_price(condition.price),
                    verdict(met)
                ),
            )
        }
        PriceTrigger::Below => {
            let met = current_price < condition.price;
            (
                met,
                format!(
                    "price {} < {} (below): {}",
                    format_price(current_price),
                    format_price(condition.price),
                    verdict(met)
                ),
            )
        }
        PriceTrigger::Between => match condition.upper_price {
            None => (
                false,
                format!(
                    "between condition missing upper_price (price {}, lower {})",
                    format_price(current_price),
                    format_price(condition.price)
                ),
            ),
            Some(upper) if upper < condition.price => (
                false,
                format!(
                    "between condition has inverted range {} > {} (price {})",
                    format_price(condition.price),
                    format_price(upper),
                    format_price(current_price)
                ),
            ),
            Some(upper) => {
                let met = condition.price <= current_price && current_price <= upper;
                (
                    met,
                    format!(
                        "{} <= price {} <= {} (between): {}",
                        format_price(condition.price),
                        format_price(current_price),
                        format_price(upper),
                        verdict(met)
                    ),
                )
            }
        },
    };

    ConditionResult::new("price", met, details)
}

/// Resolve the effective window. Relative mode needs `base_time`.
pub fn resolve_time_window(condition: &TimeCondition) -> Result<TimeWindow, String> {
    match condition.time_mode {
        TimeMode::Direct => Ok(TimeWindow {
            start: condition.start_time,
            end: condition.end_time,
        }),
        TimeMode::Relative => {
            let base = condition
                .base_time
                .ok_or_else(|| "relative time condition has no base_time".to_string())?;
            Ok(TimeWindow {
                start: condition
                    .start_offset_minutes
                    .map(|minutes| offset_from(base, minutes))
                    .transpose()?,
                end: condition
                    .end_offset_minutes
                    .map(|minutes| offset_from(base, minutes))
                    .transpose()?,
            })
        }
    }
}

fn offset_from(base: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>, String> {
    Duration::try_minutes(minutes)
        .and_then(|offset| base.checked_add_signed(offset))
        .ok_or_else(|| format!("relative offset of {} minutes out of range", minutes))
}

pub fn evaluate_time(condition: &TimeCondition, now: DateTime<Utc>) -> ConditionResult {
    let window = match resolve_time_window(condition) {
        Ok(window) => window,
        Err(reason) => return ConditionResult::new("time", false, reason),
    };

    let met = window.contains(now);
    let details = match (window.start, window.end) {
        (None, None) => "no time window set, always satisfied".to_string(),
        (Some(start), None) => format!(
            "now {} >= start {}: {}",
            now.to_rfc3339(),
            start.to_rfc3339(),
            verdict(met)
        ),
        (None, Some(end)) => format!(
            "now {} <= end {}: {}",
            now.to_rfc3339(),
            end.to_rfc3339(),
            verdict(met)
        ),
        (Some(start), Some(end)) => format!(
            "now {} within [{}, {}]: {}",
            now.to_rfc3339(),
            start.to_rfc3339(),
            end.to_rfc3339(),
            verdict(met)
        ),
    };

    ConditionResult::new("time", met, details)
}

pub fn evaluate_market(condition: &MarketCondition, tick: Option<&PriceTick>) -> ConditionResult {
    if condition.volume_trigger == Some(true) {
        let Some(threshold) = condition.volume_threshold else {
            return ConditionResult::new(
                "market",
                false,
                "volume trigger has no volume_threshold".to_string(),
            );
        };
        let Some(volume) = tick.and_then(|t| t.volume_24h) else {
            return ConditionResult::new(
                "market",
                false,
                format!(
                    "no 24h volume data (threshold {})",
                    format_amount(threshold)
                ),
            );
        };
        let met = volume >= threshold;
        return ConditionResult::new(
            "market",
            met,
            format!(
                "24h volume {} >= {}: {}",
                format_amount(volume),
                format_amount(threshold),
                verdict(met)
            ),
        );
    }

    let (Some(metric), Some(target), Some(comparison)) =
        (condition.metric.as_deref(), condition.value, condition.comparison)
    else {
        return ConditionResult::new(
            "market",
            false,
            "market condition has neither a volume trigger nor a complete metric comparison"
                .to_string(),
        );
    };

    let current = match metric.to_ascii_lowercase().as_str() {
        "volume" | "volume_24h" | "volume24h" => tick.and_then(|t| t.volume_24h),
        "market_cap" | "marketcap" => tick.and_then(|t| t.market_cap),
        other => {
            return ConditionResult::new(
                "market",
                false,
                format!("unsupported market metric '{}'", other),
            )
        }
    };

    let Some(current) = current else {
        return ConditionResult::new(
            "market",
            false,
            format!("no {} data (target {})", metric, format_amount(target)),
        );
    };

    let (met, operator) = match comparison {
        Comparison::Above => (current > target, ">"),
        Comparison::Below => (current < target, "<"),
        Comparison::Equals => (
            (current - target).abs() <= (target * EQUALS_TOLERANCE).abs(),
            "~=",
        ),
    };

    ConditionResult::new(
        "market",
        met,
        format!(
            "{} {} {} {}: {}",
            metric,
            format_amount(current),
            operator,
            format_amount(target),
            verdict(met)
        ),
    )
}

pub fn evaluate_condition(condition: &Condition, ctx: &EvaluationContext) -> ConditionResult {
    match condition {
        Condition::Price(price) => match ctx.price() {
            Some(current) => evaluate_price(price, current),
            None => ConditionResult::new(
                "price",
                false,
                format!("no price data (threshold {})", format_price(price.price)),
            ),
        },
        Condition::Time(time) => evaluate_time(time, ctx.now),
        Condition::Market(market) => evaluate_market(market, ctx.tick.as_ref()),
    }
}

/// AND requires every condition, OR any. An empty list never executes.
pub fn combine(logic: LogicType, results: &[ConditionResult]) -> bool {
    if results.is_empty() {
        return false;
    }
    match logic {
        LogicType::And => results.iter().all(|r| r.met),
        LogicType::Or => results.iter().any(|r| r.met),
    }
}

/// Evaluate every condition of `order`, regardless of which one triggered the lookup.
pub fn evaluate_order(order: &BookingOrder, ctx: &EvaluationContext) -> OrderEvaluation {
    let results: Vec<_> = order
        .conditions
        .iter()
        .map(|condition| evaluate_condition(condition, ctx))
        .collect();

    OrderEvaluation {
        order_id: order.id,
        logic: order.logic,
        should_execute: combine(order.logic, &results),
        results,
        price: ctx.price(),
        evaluated_at: ctx.now,
    }
}

fn verdict(met: bool) -> &'static str {
    if met {
        "met"
    } else {
        "not met"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::{Instrument, NewBookingOrder, OrderAction};
    use chrono::TimeZone;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn tick(price: f64) -> PriceTick {
        PriceTick::new(&Instrument::new("mint", "TKN"), price, t0())
    }

    fn order_with(conditions: Vec<Condition>, logic: LogicType) -> BookingOrder {
        let mut draft = NewBookingOrder::new(
            "u",
            "w",
            Instrument::new("mint", "TKN"),
            OrderAction::Notify,
            None,
        )
        .with_logic(logic);
        draft.conditions = conditions;
        draft.into_order(Uuid::new_v4(), t0())
    }

    fn price_condition(condition: Condition) -> PriceCondition {
        match condition {
            Condition::Price(price) => price,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_above_and_below_are_strict() {
        let above = price_condition(Condition::above(10.0));
        assert!(!evaluate_price(&above, 10.0).met);
        assert!(evaluate_price(&above, 10.01).met);

        let below = price_condition(Condition::below(10.0));
        assert!(!evaluate_price(&below, 10.0).met);
        assert!(evaluate_price(&below, 9.99).met);
    }

    #[test]
    fn test_between_boundaries_inclusive() {
        let between = price_condition(Condition::between(100.0, 200.0));
        assert!(evaluate_price(&between, 100.0).met);
        assert!(!evaluate_price(&between, 99.999).met);
        assert!(evaluate_price(&between, 200.0).met);
        assert!(!evaluate_price(&between, 200.001).met);
    }

    #[test]
    fn test_price_details_include_both_values() {
        let result = evaluate_price(&price_condition(Condition::above(10.0)), 15.0);
        assert!(result.details.contains("$15.0000"));
        assert!(result.details.contains("$10.0000"));
        assert!(result.details.contains('>'));
    }

    #[test]
    fn test_between_without_upper_is_not_met() {
        let malformed = PriceCondition {
            trigger_type: PriceTrigger::Between,
            price: 1.0,
            upper_price: None,
        };
        let result = evaluate_price(&malformed, 1.5);
        assert!(!result.met);
        assert!(result.details.contains("upper_price"));
    }

    #[test]
    fn test_relative_time_resolution() {
        let condition = TimeCondition::relative(Some(t0()), Some(30), None);
        assert!(!evaluate_time(&condition, t0() + Duration::minutes(29)).met);
        assert!(evaluate_time(&condition, t0() + Duration::minutes(30)).met);
        assert!(evaluate_time(&condition, t0() + Duration::hours(5)).met);
    }

    #[test]
    fn test_relative_negative_offsets() {
        let condition = TimeCondition::relative(Some(t0()), Some(-60), Some(-10));
        assert!(evaluate_time(&condition, t0() - Duration::minutes(30)).met);
        assert!(!evaluate_time(&condition, t0()).met);
    }

    #[test]
    fn test_relative_without_base_is_not_met() {
        let condition = TimeCondition::relative(None, Some(5), None);
        let result = evaluate_time(&condition, t0());
        assert!(!result.met);
        assert!(result.details.contains("base_time"));
    }

    #[test]
    fn test_out_of_range_offsets_are_not_met() {
        // Beyond what a minute-based duration can hold
        let huge = TimeCondition::relative(Some(t0()), Some(i64::MAX / 2), None);
        let result = evaluate_time(&huge, t0());
        assert!(!result.met);
        assert!(result.details.contains("out of range"));
        assert!(resolve_time_window(&huge).is_err());

        // Representable duration, but the sum overflows the calendar
        let overflow = TimeCondition::relative(Some(t0()), None, Some(10_000_000_000_000));
        assert!(!evaluate_time(&overflow, t0()).met);

        let negative = TimeCondition::relative(Some(t0()), Some(i64::MIN), None);
        assert!(!evaluate_time(&negative, t0()).met);
    }

    #[test]
    fn test_direct_time_presence_rules() {
        let now = t0();
        assert!(evaluate_time(&TimeCondition::direct(None, None), now).met);
        assert!(evaluate_time(&TimeCondition::direct(Some(now), None), now).met);
        assert!(!evaluate_time(&TimeCondition::direct(Some(now + Duration::seconds(1)), None), now).met);
        assert!(evaluate_time(&TimeCondition::direct(None, Some(now)), now).met);
        assert!(!evaluate_time(&TimeCondition::direct(None, Some(now - Duration::seconds(1))), now).met);
        assert!(
            evaluate_time(
                &TimeCondition::direct(Some(now - Duration::hours(1)), Some(now + Duration::hours(1))),
                now
            )
            .met
        );
    }

    #[test]
    fn test_volume_trigger() {
        let condition = MarketCondition::volume_above(1_000_000.0);
        assert!(evaluate_market(&condition, Some(&tick(1.0).with_volume(2_000_000.0))).met);
        assert!(!evaluate_market(&condition, Some(&tick(1.0).with_volume(10.0))).met);
        assert!(!evaluate_market(&condition, Some(&tick(1.0))).met);
        assert!(!evaluate_market(&condition, None).met);
    }

    #[test]
    fn test_metric_comparisons() {
        let data = tick(1.0).with_market_cap(1_000_000.0).with_volume(500.0);

        let cap_above = MarketCondition::metric("market_cap", Comparison::Above, 900_000.0);
        assert!(evaluate_market(&cap_above, Some(&data)).met);

        let volume_below = MarketCondition::metric("volume", Comparison::Below, 400.0);
        assert!(!evaluate_market(&volume_below, Some(&data)).met);

        // 1% band around the target
        let near = MarketCondition::metric("market_cap", Comparison::Equals, 1_009_000.0);
        assert!(evaluate_market(&near, Some(&data)).met);
        let far = MarketCondition::metric("market_cap", Comparison::Equals, 1_100_000.0);
        assert!(!evaluate_market(&far, Some(&data)).met);

        let unknown = MarketCondition::metric("holders", Comparison::Above, 1.0);
        let result = evaluate_market(&unknown, Some(&data));
        assert!(!result.met);
        assert!(result.details.contains("unsupported"));
    }

    #[test]
    fn test_and_or_combination() {
        let conditions = vec![Condition::above(10.0), Condition::below(20.0)];
        let and_order = order_with(conditions.clone(), LogicType::And);
        let or_order = order_with(conditions, LogicType::Or);

        let at_15 = EvaluationContext::new(Some(tick(15.0)), t0());
        let at_25 = EvaluationContext::new(Some(tick(25.0)), t0());

        assert!(evaluate_order(&and_order, &at_15).should_execute);
        assert!(!evaluate_order(&and_order, &at_25).should_execute);
        assert!(evaluate_order(&or_order, &at_25).should_execute);

        let evaluation = evaluate_order(&and_order, &at_25);
        assert_eq!(evaluation.results.len(), 2);
        assert!(evaluation.results[0].met);
        assert!(!evaluation.results[1].met);
        assert_eq!(evaluation.price, Some(25.0));
    }

    #[test]
    fn test_missing_price_is_not_met() {
        let order = order_with(vec![Condition::above(1.0)], LogicType::Or);
        let evaluation = evaluate_order(&order, &EvaluationContext::new(None, t0()));
        assert!(!evaluation.should_execute);
        assert!(evaluation.results[0].details.contains("no price data"));
    }

    #[test]
    fn test_empty_conditions_never_execute() {
        assert!(!combine(LogicType::And, &[]));
        assert!(!combine(LogicType::Or, &[]));
    }

    proptest! {
        #[test]
        fn prop_between_matches_inclusive_range(
            lower in 0.0001f64..1_000.0,
            width in 0.0f64..1_000.0,
            price in 0.0f64..3_000.0,
        ) {
            let upper = lower + width;
            let condition = price_condition(Condition::between(lower, upper));
            let result = evaluate_price(&condition, price);
            prop_assert_eq!(result.met, lower <= price && price <= upper);
        }

        #[test]
        fn prop_or_is_at_least_as_permissive_as_and(
            thresholds in proptest::collection::vec((0.0f64..100.0, any::<bool>()), 1..6),
            price in 0.0f64..100.0,
        ) {
            let conditions: Vec<_> = thresholds
                .iter()
                .map(|(t, above)| if *above { Condition::above(*t) } else { Condition::below(*t) })
                .collect();
            let ctx = EvaluationContext::new(Some(tick(price)), t0());
            let and_result = evaluate_order(&order_with(conditions.clone(), LogicType::And), &ctx);
            let or_result = evaluate_order(&order_with(conditions, LogicType::Or), &ctx);
            prop_assert!(!and_result.should_execute || or_result.should_execute);
        }
    }
}
