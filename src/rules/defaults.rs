//! The four default dynamic-priority rules, evaluated in this order.

use super::Rule;
use crate::config::Mode;
use crate::types::{PagePriority, PartialPlan, PriorityClass, SettingsBundle, SystemSnapshot};

const TWO_GIB_MB: u64 = 2 * 1024;

pub fn default_rules() -> Vec<Rule> {
    vec![battery_low_rule(), gaming_hot_rule(), extreme_idle_cpu_rule(), low_memory_rule()]
}

/// `battery < 20% ∧ is_laptop` → all background → `Idle`; request aggressive trim.
fn battery_low_rule() -> Rule {
    Rule::new(
        "battery_low_on_laptop",
        |s: &SystemSnapshot| s.is_laptop && s.battery_pct.map(|pct| pct < 20).unwrap_or(false),
        |_: &SystemSnapshot| {
            let mut bundle = SettingsBundle::default();
            bundle.priority_class = Some(PriorityClass::Idle);
            let mut plan = PartialPlan::default();
            plan.background_bundle = Some(bundle);
            plan.reduce_cpu_usage = Some(true);
            plan.aggressive_trim = Some(true);
            plan
        },
    )
}

/// `mode = gaming ∧ temp > 85°C` → background → `BelowNormal`; throttle background.
fn gaming_hot_rule() -> Rule {
    Rule::new(
        "gaming_overheating",
        |s: &SystemSnapshot| s.mode == Mode::Game && s.max_temp_c.map(|t| t > 85).unwrap_or(false),
        |_: &SystemSnapshot| {
            let mut bundle = SettingsBundle::default();
            bundle.priority_class = Some(PriorityClass::BelowNormal);
            let mut plan = PartialPlan::default();
            plan.background_bundle = Some(bundle);
            plan.background_cpu_rate_percent = Some(30);
            plan
        },
    )
}

/// `mode = extreme ∧ cpu < 50%` → foreground → `Realtime`; boost quantum.
fn extreme_idle_cpu_rule() -> Rule {
    Rule::new(
        "extreme_headroom",
        |s: &SystemSnapshot| s.mode == Mode::Extreme && s.cpu_load_pct < 50.0,
        |_: &SystemSnapshot| {
            let mut bundle = SettingsBundle::default();
            bundle.priority_class = Some(PriorityClass::Realtime);
            let mut plan = PartialPlan::default();
            plan.foreground_bundle = Some(bundle);
            // Quantum multiplier range is 1..=10; extreme mode
            // with CPU headroom uses the top of that documented range.
            plan.quantum_multiplier = Some(10);
            plan
        },
    )
}

/// `mem_avail < 2 GiB` → trim all background; aggressive memory reclaim.
fn low_memory_rule() -> Rule {
    Rule::new(
        "low_memory",
        |s: &SystemSnapshot| s.mem_avail_mb < TWO_GIB_MB,
        |_: &SystemSnapshot| {
            let mut bundle = SettingsBundle::default();
            bundle.working_set_trim = Some(true);
            bundle.page_priority = Some(PagePriority::Low);
            let mut plan = PartialPlan::default();
            plan.background_bundle = Some(bundle);
            plan.aggressive_trim = Some(true);
            plan
        },
    )
}
