//! Metrics 模块
//!
//! 记录装配步骤的结果

use autoconf_adapter_kafka::{StepOutcome, StepReport};
use metrics::counter;

pub const COMPONENTS_TOTAL: &str = "autoconf_components_total";

/// 记录单个组件的装配结果
pub fn record_component(component: &str, outcome: StepOutcome) {
    let labels = [
        ("component", component.to_string()),
        ("outcome", outcome.as_str().to_string()),
    ];

    counter!(COMPONENTS_TOTAL, &labels).increment(1);
}

/// 记录一组装配步骤
pub fn record_report(report: &[StepReport]) {
    for step in report {
        record_component(step.component, step.outcome);
    }
}
