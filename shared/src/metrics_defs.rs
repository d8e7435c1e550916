//! Common types for metrics definitions.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

impl MetricType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "Counter",
            MetricType::Gauge => "Gauge",
            MetricType::Histogram => "Histogram",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

/// Records against a `MetricDef`, optionally with labels:
/// `counter!(REQUESTS_REJECTED, "reason" => "unknown_app").increment(1)`
#[macro_export]
macro_rules! counter {
    ($def:expr $(, $key:expr => $value:expr)* $(,)?) => {
        metrics::counter!($def.name $(, $key => $value)*)
    };
}

#[macro_export]
macro_rules! gauge {
    ($def:expr $(, $key:expr => $value:expr)* $(,)?) => {
        metrics::gauge!($def.name $(, $key => $value)*)
    };
}

#[macro_export]
macro_rules! histogram {
    ($def:expr $(, $key:expr => $value:expr)* $(,)?) => {
        metrics::histogram!($def.name $(, $key => $value)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COUNTER: MetricDef = MetricDef {
        name: "test.counter",
        metric_type: MetricType::Counter,
        description: "Counter used by the macro tests",
    };

    #[test]
    fn test_macros_accept_labels() {
        // Without a global recorder installed these are no-ops; this checks the expansion.
        counter!(TEST_COUNTER).increment(1);
        counter!(TEST_COUNTER, "outcome" => "accepted").increment(1);
        gauge!(TEST_COUNTER, "a" => "b", "c" => String::from("d")).set(1.0);
        histogram!(TEST_COUNTER, "status" => "200",).record(0.5);
        assert_eq!(TEST_COUNTER.metric_type.as_str(), "Counter");
    }
}
