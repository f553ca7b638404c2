//! Executor configuration

/// Default nesting limit for stub calls.
const DEFAULT_MAX_CALL_DEPTH: u32 = 256;

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Maximum nesting of stub and value calls (default: 256)
    pub max_call_depth: u32,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl ExecConfig {
    /// Defaults, with `OTTER_STUB_MAX_CALL_DEPTH=<n>` overriding the depth limit.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`Self::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(depth) = parse_u32(lookup("OTTER_STUB_MAX_CALL_DEPTH")) {
            config.max_call_depth = depth;
        }
        config
    }
}

fn parse_u32(value: Option<String>) -> Option<u32> {
    value
        .and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value > 0)
}
