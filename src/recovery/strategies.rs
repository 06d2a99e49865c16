use serde::Serialize;

/// A recovery action with its place in the attempt order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Strategy {
    pub action: &'static str,
    pub priority: u8,
}

const fn strategy(action: &'static str, priority: u8) -> Strategy {
    Strategy { action, priority }
}

/// Recovery strategies per incident type, in priority order
pub const RECOVERY_STRATEGIES: &[(&str, [Strategy; 3])] = &[
    (
        "cpu",
        [
            strategy("restart_service", 1),
            strategy("scale_horizontally", 2),
            strategy("optimize_resources", 3),
        ],
    ),
    (
        "memory",
        [
            strategy("clear_cache", 1),
            strategy("restart_service", 2),
            strategy("scale_vertically", 3),
        ],
    ),
    (
        "disk",
        [
            strategy("cleanup_logs", 1),
            strategy("archive_data", 2),
            strategy("expand_storage", 3),
        ],
    ),
    (
        "response_time",
        [
            strategy("restart_service", 1),
            strategy("scale_horizontally", 2),
            strategy("enable_caching", 3),
        ],
    ),
    (
        "error_rate",
        [
            strategy("rollback_deployment", 1),
            strategy("restart_service", 2),
            strategy("enable_circuit_breaker", 3),
        ],
    ),
];

/// Strategies for an incident type, empty when none are known
pub fn strategies_for(metric_name: &str) -> &'static [Strategy] {
    RECOVERY_STRATEGIES
        .iter()
        .find(|(metric, _)| *metric == metric_name)
        .map(|(_, strategies)| strategies.as_slice())
        .unwrap_or(&[])
}

/// Find the incident type mentioned in free text such as an error message
pub fn metric_from_text(text: &str) -> Option<&'static str> {
    let text = text.to_lowercase();
    RECOVERY_STRATEGIES
        .iter()
        .map(|(metric, _)| *metric)
        .find(|metric| text.contains(metric))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategies_are_in_priority_order() {
        for (_, strategies) in RECOVERY_STRATEGIES {
            let priorities: Vec<u8> = strategies.iter().map(|s| s.priority).collect();
            assert_eq!(priorities, vec![1, 2, 3]);
        }
    }

    #[test]
    fn test_lookup() {
        let memory: Vec<&str> = strategies_for("memory").iter().map(|s| s.action).collect();
        assert_eq!(memory, vec!["clear_cache", "restart_service", "scale_vertically"]);
        assert!(strategies_for("unknown").is_empty());
    }

    #[test]
    fn test_metric_from_text() {
        assert_eq!(metric_from_text("CPU exceeded threshold"), Some("cpu"));
        assert_eq!(metric_from_text("error_rate exceeded threshold"), Some("error_rate"));
        assert_eq!(metric_from_text("response_time exceeded threshold"), Some("response_time"));
        assert_eq!(metric_from_text("something odd"), None);
    }
}
