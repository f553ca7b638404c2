//! Heap configuration

/// Smallest region that still fits the bootstrap entities.
const MIN_REGION_SIZE: usize = 4 * 1024;

/// Heap configuration
#[derive(Debug, Clone)]
pub struct HeapConfig {
    /// Size of the bump region in bytes (default: 1MB)
    pub region_size: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            region_size: 1024 * 1024, // 1MB
        }
    }
}

impl HeapConfig {
    /// Defaults, with `OTTER_STUB_HEAP_SIZE=<bytes>` overriding the region size.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`Self::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(size) = parse_usize(lookup("OTTER_STUB_HEAP_SIZE")) {
            config.region_size = size.max(MIN_REGION_SIZE);
        }
        config
    }

    /// Config with an explicit region size.
    pub fn with_region_size(region_size: usize) -> Self {
        Self { region_size }
    }
}

fn parse_usize(value: Option<String>) -> Option<usize> {
    value
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(value: &'static str) -> impl Fn(&str) -> Option<String> {
        move |name| (name == "OTTER_STUB_HEAP_SIZE").then(|| value.to_string())
    }

    #[test]
    fn region_size_override() {
        assert_eq!(HeapConfig::from_lookup(lookup(" 65536 ")).region_size, 65536);
    }

    #[test]
    fn small_regions_are_clamped() {
        assert_eq!(HeapConfig::from_lookup(lookup("16")).region_size, MIN_REGION_SIZE);
    }

    #[test]
    fn invalid_values_keep_the_default() {
        let default = HeapConfig::default().region_size;
        assert_eq!(HeapConfig::from_lookup(lookup("0")).region_size, default);
        assert_eq!(HeapConfig::from_lookup(lookup("1MB")).region_size, default);
        assert_eq!(HeapConfig::from_lookup(|_| None).region_size, default);
    }
}
