use crate::models::{DataSourceOptions, QueryForm, RateOptions, TranslatedQuery};

use super::duration;

pub const DEFAULT_AGGREGATOR: &str = "avg";
pub const DEFAULT_DOWNSAMPLE: &str = "60000ms-avg";
const NO_FILL_POLICY: &str = "none";

/// Builds the outgoing query for a form. Never fails: malformed numeric or
/// interval fields fall back to their defaults.
pub fn translate(form: &QueryForm, options: &DataSourceOptions) -> TranslatedQuery {
    let mut query = TranslatedQuery {
        metric: form.metric.clone(),
        aggregator: "none".to_string(),
        rate: false,
        rate_options: RateOptions::default(),
        downsample: DEFAULT_DOWNSAMPLE.to_string(),
        tags: form.tags.clone(),
        filters: form.filters.clone(),
        tsuids: form.tsuids.clone(),
    };

    // Requested datasource tags overwrite caller tags with the same key.
    for key in &form.datasource_tags {
        if let Some(value) = options.datasource_tags.get(key) {
            query.tags.insert(key.clone(), value.clone());
        }
    }

    query.aggregator = if form.aggregator.is_empty() {
        DEFAULT_AGGREGATOR.to_string()
    } else {
        form.aggregator.clone()
    };

    if form.should_compute_rate {
        query.rate = true;
        query.rate_options.counter = form.is_counter;
        query.rate_options.interval = form.rate_interval.clone();
        query.rate_options.counter_max = parse_i32_or_zero(&form.counter_max);
        query.rate_options.reset_value = parse_i32_or_zero(&form.counter_reset_value);
    }

    if !form.disable_downsampling {
        if let Some(millis) = duration::parse_millis(&form.downsample_interval) {
            query.downsample = format!("{}ms-{}", millis, form.downsample_aggregator);
        }
        let fill = form.downsample_fill_policy.as_str();
        if !fill.is_empty() && fill != NO_FILL_POLICY {
            query.downsample.push('-');
            query.downsample.push_str(fill);
        }
    }

    query
}

/// Base-10 32-bit parse; empty, non-numeric and out-of-range input yield 0.
fn parse_i32_or_zero(raw: &str) -> i32 {
    raw.parse::<i32>().unwrap_or(0)
}
